//! Generated study material: games, grading, concept graph, insights, exercises.

use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use std::sync::Arc;
use studyos_rs_protocol::{
    CognitiveExercise, GameMode, Grade, KnowledgeNode, MetaInsight, Question,
};

const DEFAULT_GAME_QUESTIONS: usize = 5;
const MAX_GAME_QUESTIONS: usize = 20;

#[derive(Debug, Deserialize)]
pub struct GameBody {
    pub topic: String,
    pub mode: GameMode,
    #[serde(default)]
    pub count: Option<usize>,
}

pub async fn game_questions(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GameBody>,
) -> Result<Json<Vec<Question>>, ApiError> {
    if body.topic.trim().is_empty() {
        return Err(ApiError::BadRequest("topic is required".to_string()));
    }
    let count = body
        .count
        .unwrap_or(DEFAULT_GAME_QUESTIONS)
        .clamp(1, MAX_GAME_QUESTIONS);
    let questions = state
        .generator
        .game_questions(&body.topic, body.mode, &state.files.ready(), count)
        .await;
    Ok(Json(questions))
}

#[derive(Debug, Deserialize)]
pub struct GradeBody {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub mark_scheme: Vec<String>,
}

pub async fn grade(State(state): State<Arc<AppState>>, Json(body): Json<GradeBody>) -> Json<Grade> {
    Json(
        state
            .generator
            .grade(&body.question, &body.answer, &body.mark_scheme)
            .await,
    )
}

pub async fn knowledge_graph(State(state): State<Arc<AppState>>) -> Json<Vec<KnowledgeNode>> {
    Json(state.generator.knowledge_graph(&state.files.ready()).await)
}

/// Insights over the current chat transcript.
pub async fn insights(State(state): State<Arc<AppState>>) -> Json<Vec<MetaInsight>> {
    Json(state.generator.meta_analysis(&state.chat.messages()).await)
}

pub async fn exercises(State(state): State<Arc<AppState>>) -> Json<Vec<CognitiveExercise>> {
    Json(state.generator.cognitive_exercises().await)
}
