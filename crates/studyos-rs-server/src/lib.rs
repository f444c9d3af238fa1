//! HTTP API for Study OS.
//!
//! Exposes the completion proxy, provider management, the chat controller,
//! uploaded sources, generated study material and the proctored exam over
//! JSON and NDJSON.

pub mod api;
pub mod error;
pub mod state;

use axum::Router;
use log::info;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

pub use error::{ApiError, ServerError};
pub use state::{AppState, EventHub};

/// Build the application router.
pub fn app(state: Arc<AppState>) -> Router {
    api::routes()
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    state: Arc<AppState>,
    bind: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|source| ServerError::Bind {
            addr: bind.to_string(),
            source,
        })?;
    let addr = listener.local_addr()?;
    info!("server bound (addr={})", addr);
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("server stopped (addr={})", addr);
    Ok(())
}
