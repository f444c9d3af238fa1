//! Local persistence for routing preferences and chat transcripts.

mod preferences;
mod transcript;

pub use preferences::{JsonPreferenceStore, PreferenceStore, ProviderOverrides, StoredPreferences};
pub use transcript::{JsonlTranscriptStore, TranscriptRecord, TranscriptStore};

use directories::ProjectDirs;
use std::path::PathBuf;
use studyos_rs_config::StateConfig;
use studyos_rs_protocol::SessionId;
use thiserror::Error;

/// File name of the preference store under the state root.
pub const PREFERENCES_FILE: &str = "preferences.json";
/// Directory of transcript rollouts under the state root.
pub const TRANSCRIPTS_DIR: &str = "transcripts";

/// Errors returned by the state stores.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unsupported schema version: {0}")]
    UnsupportedSchema(u32),
    #[error("missing transcript metadata")]
    MissingMetadata,
    #[error("transcript already exists: {0}")]
    TranscriptExists(SessionId),
}

/// Configured state root, or the platform data directory.
pub fn resolve_state_root(config: &StateConfig) -> Option<PathBuf> {
    config.root.clone().or_else(|| {
        ProjectDirs::from("app", "studyos", "studyos").map(|dirs| dirs.data_dir().to_path_buf())
    })
}
