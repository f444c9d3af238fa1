//! Error types for the HTTP layer.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::{error, warn};
use serde_json::json;
use studyos_rs_core::exam::ExamError;
use studyos_rs_core::{CoreError, UploadError};
use thiserror::Error;

/// Errors returned by route handlers, rendered as `{"error": message}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or rejected input.
    #[error("{0}")]
    BadRequest(String),
    /// Referenced resource does not exist.
    #[error("{0}")]
    NotFound(String),
    /// Request conflicts with the current state (busy stream, wrong exam phase).
    #[error("{0}")]
    Conflict(String),
    /// The resolved provider cannot serve requests.
    #[error("{0}")]
    Unavailable(String),
    /// The provider call failed.
    #[error("{0}")]
    Upstream(String),
    /// Anything else.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("request failed (status={}, error={})", status.as_u16(), self);
        } else {
            warn!("request rejected (status={}, error={})", status.as_u16(), self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnknownProvider(_) | CoreError::UnsupportedSetting { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            CoreError::ProviderUnavailable(_) => ApiError::Unavailable(err.to_string()),
            CoreError::Backend(_) | CoreError::Parse(_) => ApiError::Upstream(err.to_string()),
            CoreError::State(_) | CoreError::Io(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ExamError> for ApiError {
    fn from(err: ExamError) -> Self {
        match err {
            ExamError::InvalidTransition { .. } | ExamError::Busy | ExamError::LockDenied(_) => {
                ApiError::Conflict(err.to_string())
            }
            ExamError::UnknownQuestion(_) => ApiError::NotFound(err.to_string()),
            ExamError::GenerationFailed(_) => ApiError::Upstream(err.to_string()),
            ExamError::InvalidConfig(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

/// Errors raised while building or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Core component construction failed.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    /// Exam machine construction failed.
    #[error("exam error: {0}")]
    Exam(#[from] ExamError),
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// IO error while serving.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
