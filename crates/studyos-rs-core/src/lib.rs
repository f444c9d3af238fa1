//! Core primitives for Study OS.
//!
//! This crate owns provider routing, the streaming chat controller, the
//! proctored exam machine, content generation, uploads, and local persistence
//! used by the server and CLI.

pub mod chat;
pub mod error;
pub mod exam;
pub mod generation;
pub mod prompt;
pub mod router;
pub mod scoring;
pub mod state;
pub mod types;
pub mod uploads;

pub use chat::{ChatControllerBuilder, ChatStreamController, RejectReason, SendHandle, SendOutcome};
pub use error::CoreError;
pub use exam::{
    ClientReportedMonitor, EnvironmentMonitor, EnvironmentSignal, ExamError, ExamMachineBuilder,
    ExamResults, ExamSnapshot, PaperSource, ProctoredSessionMachine,
};
pub use generation::ContentGenerator;
pub use router::{
    CompletionOutcome, CompletionRequest, CompletionStream, DefaultBackendFactory,
    GenerateRequest, ProviderRouter, ProviderSetting, RouterStatus,
};
/// Event sink shared by the chat controller and exam machine.
pub use studyos_rs_protocol::EventSink;
pub use types::{ChatMessage, ChatRole, ImageAttachment};
pub use uploads::{FileLibrary, UploadError, validate_file};
