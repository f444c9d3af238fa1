//! Test helpers shared across Study OS crates.

pub mod backend;
pub mod events;
pub mod llm;
pub mod monitor;

pub use backend::{ScriptStep, ScriptedBackend, ScriptedFactory};
pub use events::RecordingSink;
pub use llm::{ScriptedLLM, TextResponse};
pub use monitor::FakeEnvironmentMonitor;
