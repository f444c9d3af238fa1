//! HTTP routes.

mod chat;
mod events;
mod exam;
mod files;
pub mod generate;
mod providers;
mod study;

use crate::state::AppState;
use axum::Router;
use axum::routing::{delete, get, post, put};
use serde_json::{Value, json};
use std::sync::Arc;

async fn health() -> axum::Json<Value> {
    axum::Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        // Completion proxy
        .route("/api/generate", post(generate::generate))
        .route("/api/stream", post(generate::stream))
        .route("/api/events", get(events::stream))
        // Providers
        .route("/api/providers", get(providers::status))
        .route("/api/providers/preference", put(providers::set_preference))
        .route("/api/providers/{kind}", put(providers::configure))
        // Chat
        .route("/api/chat", get(chat::transcript))
        .route("/api/chat/messages", post(chat::send))
        .route("/api/chat/stop", post(chat::stop))
        .route("/api/chat/settings", put(chat::update_settings))
        // Source files
        .route("/api/files", get(files::list).post(files::upload))
        .route("/api/files/{id}", delete(files::remove))
        // Study material
        .route("/api/study/games", post(study::game_questions))
        .route("/api/study/grade", post(study::grade))
        .route("/api/study/graph", get(study::knowledge_graph))
        .route("/api/study/insights", get(study::insights))
        .route("/api/study/exercises", get(study::exercises))
        // Exam
        .route("/api/exam", get(exam::snapshot))
        .route("/api/exam/start", post(exam::start))
        .route("/api/exam/answers", post(exam::answer))
        .route("/api/exam/submit", post(exam::submit))
        .route("/api/exam/reset", post(exam::reset))
        .route("/api/exam/signals", post(exam::signal))
}
