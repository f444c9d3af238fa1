//! Completion proxy endpoints.

use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::Response;
use futures_util::StreamExt;
use log::{debug, info};
use serde::Deserialize;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use studyos_rs_core::{ChatMessage, CompletionRequest, GenerateRequest, ImageAttachment};
use studyos_rs_protocol::{AgentRole, DigitalTwin, FeatureFlags};
use tokio_util::sync::CancellationToken;

pub const NDJSON: &str = "application/x-ndjson";

/// Header naming the provider that serves a proxied stream.
pub const PROVIDER_HEADER: &str = "x-studyos-provider";

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub prompt: String,
    /// Turn placed ahead of the prompt, e.g. extracted file text.
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
    /// JSON schema the reply must follow.
    #[serde(default)]
    pub schema: Option<Value>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<Value>, ApiError> {
    if body.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt is required".to_string()));
    }
    let mut request = GenerateRequest::new(body.prompt);
    if let Some(context) = body.context.filter(|context| !context.trim().is_empty()) {
        request = request.with_context(context);
    }
    if let Some(schema) = body.schema {
        request = request.with_schema(schema);
    }
    if let Some(temperature) = body.temperature {
        request.temperature = temperature;
    }
    request.system = body.system;
    let text = state.router.complete(request).await?;
    debug!("proxied completion (len={})", text.len());
    Ok(Json(json!({ "text": text })))
}

fn default_use_files() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct StreamBody {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub image: Option<ImageAttachment>,
    #[serde(default)]
    pub persona: AgentRole,
    #[serde(default)]
    pub flags: FeatureFlags,
    #[serde(default)]
    pub twin: Option<DigitalTwin>,
    /// Ground the reply in the ready uploaded files.
    #[serde(default = "default_use_files")]
    pub use_files: bool,
}

/// Stream one tutor reply as NDJSON fragments.
///
/// Dropping the response body (client disconnect) cancels the upstream call.
pub async fn stream(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StreamBody>,
) -> Result<Response, ApiError> {
    if body.prompt.trim().is_empty() && body.image.is_none() {
        return Err(ApiError::BadRequest("prompt or image is required".to_string()));
    }
    let files = if body.use_files {
        state.files.ready()
    } else {
        Vec::new()
    };
    let cancel = CancellationToken::new();
    let completion = state.router.stream_completion(
        CompletionRequest {
            history: vec![ChatMessage::user(body.prompt, body.image)],
            persona: body.persona,
            twin: body.twin,
            files,
            flags: body.flags.normalized(),
        },
        cancel.clone(),
    );
    let provider = completion.provider.kind;
    info!("proxy stream started (provider={}, persona={})", provider, body.persona);

    let guard = cancel.drop_guard();
    let lines = completion.map(move |fragment| {
        let _cancel_on_drop = &guard;
        let mut line = serde_json::to_string(&fragment).unwrap_or_default();
        line.push('\n');
        Ok::<_, Infallible>(line)
    });
    Response::builder()
        .header(CONTENT_TYPE, NDJSON)
        .header(PROVIDER_HEADER, provider.as_str())
        .body(Body::from_stream(lines))
        .map_err(|err| ApiError::Internal(err.to_string()))
}
