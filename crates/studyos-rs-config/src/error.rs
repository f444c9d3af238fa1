use thiserror::Error;

/// Failure while loading or checking a Study OS config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file exists but could not be read, or a runtime layer is missing.
    #[error("could not read config file: {0}")]
    ReadFailed(#[from] std::io::Error),
    /// The file is not valid JSON5.
    #[error("config is not valid JSON5: {0}")]
    ParseFailed(#[from] json5::Error),
    /// Schema-valid JSON that still does not fit [`crate::StudyOsConfig`].
    #[error("config could not be decoded: {0}")]
    DecodeFailed(#[from] serde_json::Error),
    /// One field broke a schema or range rule; `path` reads `layer:field`.
    #[error("invalid config at {path}: {message}")]
    InvalidField { path: String, message: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}
