use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use studyos_rs_protocol::FileDocument;

pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<FileDocument>> {
    Json(state.files.list())
}

/// Extracted document text; the browser handles PDF and DOCX parsing.
#[derive(Debug, Deserialize)]
pub struct UploadBody {
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    pub content: String,
}

pub async fn upload(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UploadBody>,
) -> Result<(StatusCode, Json<FileDocument>), ApiError> {
    let document = state
        .files
        .add(&body.name, &body.mime_type, body.content, &state.config.uploads)?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.files.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("file not found: {id}")))
    }
}
