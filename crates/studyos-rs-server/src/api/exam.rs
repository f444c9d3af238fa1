//! Proctored exam endpoints.
//!
//! The browser owns the real full-screen and focus APIs. It reports whether
//! it entered full-screen when starting and forwards each environment signal
//! to `/api/exam/signals`, where the client-reported monitor dispatches it to
//! the exam machine.

use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use studyos_rs_core::{EnvironmentSignal, ExamResults, ExamSnapshot};

pub async fn snapshot(State(state): State<Arc<AppState>>) -> Json<ExamSnapshot> {
    Json(state.exam.snapshot())
}

#[derive(Debug, Deserialize)]
pub struct StartBody {
    /// Defaults to the configured exam topic.
    #[serde(default)]
    pub topic: Option<String>,
    /// Whether the client entered full-screen mode.
    pub fullscreen: bool,
}

pub async fn start(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartBody>,
) -> Result<Json<ExamSnapshot>, ApiError> {
    let topic = body
        .topic
        .filter(|topic| !topic.trim().is_empty())
        .unwrap_or_else(|| state.config.exam.topic.clone());
    state.monitor.set_lock_available(body.fullscreen);
    state.exam.start(&topic, &state.files.ready()).await?;
    Ok(Json(state.exam.snapshot()))
}

#[derive(Debug, Deserialize)]
pub struct AnswerBody {
    pub question_id: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct AnswerAccepted {
    /// The answer matched the denylist and counted as a violation.
    pub flagged: bool,
    pub violations: u32,
}

pub async fn answer(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AnswerBody>,
) -> Result<Json<AnswerAccepted>, ApiError> {
    let flagged = state.exam.answer(&body.question_id, body.text)?;
    Ok(Json(AnswerAccepted {
        flagged,
        violations: state.exam.violation_count(),
    }))
}

pub async fn submit(State(state): State<Arc<AppState>>) -> Result<Json<ExamResults>, ApiError> {
    Ok(Json(state.exam.submit()?))
}

pub async fn reset(State(state): State<Arc<AppState>>) -> Result<Json<ExamSnapshot>, ApiError> {
    state.exam.reset()?;
    Ok(Json(state.exam.snapshot()))
}

#[derive(Debug, Deserialize)]
pub struct SignalBody {
    pub signal: EnvironmentSignal,
}

/// Deliver a client-reported signal. Signals outside an exam are ignored.
pub async fn signal(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SignalBody>,
) -> Json<ExamSnapshot> {
    let delivered = state.monitor.report(body.signal);
    debug!(
        "client signal reported (signal={}, handlers={})",
        body.signal, delivered
    );
    Json(state.exam.snapshot())
}
