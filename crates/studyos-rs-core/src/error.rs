//! Error types for the core crate.

use crate::router::BackendError;
use crate::state::StateError;
use studyos_rs_protocol::ProviderKind;
use thiserror::Error;

/// Errors returned by router, generator, and persistence operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Provider name did not match a known kind.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    /// The setting does not apply to the given provider kind.
    #[error("provider {kind} does not accept setting: {setting}")]
    UnsupportedSetting {
        kind: ProviderKind,
        setting: &'static str,
    },
    /// The resolved provider is missing its credential or connection settings.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// The backend call failed.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    /// Persistence failed.
    #[error("state error: {0}")]
    State(#[from] StateError),
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Structured output could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
}
