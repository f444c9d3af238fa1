use crate::api::generate::NDJSON;
use crate::error::ApiError;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::Response;
use futures_util::StreamExt;
use log::warn;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

/// Live chat and exam events as NDJSON.
pub async fn stream(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let events = BroadcastStream::new(state.events.subscribe()).filter_map(|event| async move {
        match event {
            Ok(event) => {
                let mut line = serde_json::to_string(&event).ok()?;
                line.push('\n');
                Some(Ok::<_, Infallible>(line))
            }
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!("event subscriber lagged (skipped={})", skipped);
                None
            }
        }
    });
    Response::builder()
        .header(CONTENT_TYPE, NDJSON)
        .body(Body::from_stream(events))
        .map_err(|err| ApiError::Internal(err.to_string()))
}
