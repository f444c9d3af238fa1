//! Chat transcript endpoints backed by the shared controller.

use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use studyos_rs_core::{ChatMessage, ImageAttachment, RejectReason, SendOutcome};
use studyos_rs_protocol::{AgentRole, DigitalTwin, FeatureFlags, MessageId, SessionId};

#[derive(Debug, Serialize)]
pub struct TranscriptView {
    pub transcript_id: SessionId,
    pub streaming: bool,
    pub persona: AgentRole,
    pub flags: FeatureFlags,
    pub messages: Vec<ChatMessage>,
}

pub async fn transcript(State(state): State<Arc<AppState>>) -> Json<TranscriptView> {
    let chat = &state.chat;
    Json(TranscriptView {
        transcript_id: chat.transcript_id(),
        streaming: chat.is_streaming(),
        persona: chat.persona(),
        flags: chat.flags(),
        messages: chat.messages(),
    })
}

#[derive(Debug, Deserialize)]
pub struct SendBody {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image: Option<ImageAttachment>,
    #[serde(default)]
    pub persona: Option<AgentRole>,
}

#[derive(Debug, Serialize)]
pub struct SendAccepted {
    pub user_message_id: MessageId,
    pub reply_id: MessageId,
}

/// Start a reply; progress is visible through the transcript and `/api/events`.
pub async fn send(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SendBody>,
) -> Result<(StatusCode, Json<SendAccepted>), ApiError> {
    match state.chat.send(body.text, body.image, body.persona) {
        SendOutcome::Started(handle) => Ok((
            StatusCode::ACCEPTED,
            Json(SendAccepted {
                user_message_id: handle.user_message_id,
                reply_id: handle.reply_id,
            }),
        )),
        SendOutcome::Rejected(RejectReason::Blank) => {
            Err(ApiError::BadRequest("message text or image is required".to_string()))
        }
        SendOutcome::Rejected(RejectReason::Busy) => {
            Err(ApiError::Conflict("a reply is already streaming".to_string()))
        }
    }
}

pub async fn stop(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "stopped": state.chat.stop() }))
}

#[derive(Debug, Deserialize)]
pub struct SettingsBody {
    #[serde(default)]
    pub persona: Option<AgentRole>,
    #[serde(default)]
    pub flags: Option<FeatureFlags>,
    /// `null` clears the learner profile; omitting the field keeps it.
    #[serde(default, deserialize_with = "double_option::deserialize")]
    pub twin: Option<Option<DigitalTwin>>,
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SettingsBody>,
) -> Json<TranscriptView> {
    if let Some(persona) = body.persona {
        state.chat.set_persona(persona);
    }
    if let Some(flags) = body.flags {
        state.chat.set_flags(flags);
    }
    if let Some(twin) = body.twin {
        state.chat.set_twin(twin);
    }
    transcript(State(state)).await
}
