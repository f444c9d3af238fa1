//! Wire protocol types for Study OS events, provider routing, and study content.

mod content;
mod provider;

pub use content::{
    AgentRole, CognitiveExercise, CognitiveSkill, Difficulty, DigitalTwin, ExamPaper, ExamSkills,
    ExerciseDifficulty, FileDocument, FileKind, FileStatus, GameMode, Grade, InsightKind,
    KnowledgeNode, MetaInsight, Question, QuestionKind,
};
pub use provider::{
    CredentialOrigin, FeatureFlags, GroundingLink, ProviderKind, RoutingPreference,
    StreamFragment, merge_grounding,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a chat transcript or exam session.
pub type SessionId = Uuid;
/// Unique identifier for a transcript message.
pub type MessageId = Uuid;

/// Wrapper for events emitted by the chat controller and exam machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMsg {
    /// Unique id for the event.
    pub id: Uuid,
    /// Transcript or exam session the event belongs to.
    pub session_id: SessionId,
    /// Timestamp when the event was created.
    pub created_at: DateTime<Utc>,
    /// Event payload content.
    pub payload: EventPayload,
}

impl EventMsg {
    /// Stamp a payload with a fresh id and the current time.
    pub fn new(session_id: SessionId, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            created_at: Utc::now(),
            payload,
        }
    }
}

/// Lifecycle phase of a proctored exam.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExamPhase {
    Setup,
    Exam,
    Results,
    Disqualified,
}

/// All events emitted during chat turns and exam sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "payload")]
pub enum EventPayload {
    /// A message was appended to the transcript.
    MessageAppended {
        message_id: MessageId,
        role: String,
    },
    /// Streaming text delta for an assistant message.
    MessageDelta { message_id: MessageId, delta: String },
    /// New citations were merged into an assistant message.
    GroundingUpdated {
        message_id: MessageId,
        grounding: Vec<GroundingLink>,
    },
    /// The assistant message stopped streaming.
    MessageCompleted {
        message_id: MessageId,
        stopped: bool,
    },
    /// Exam lifecycle transition.
    ExamPhaseChanged { from: ExamPhase, to: ExamPhase },
    /// An integrity violation was recorded.
    ViolationRecorded { count: u32, reason: String },
    /// The transient violation warning was cleared.
    WarningCleared,
    /// Error event for the session.
    Error { message: String },
}

/// Sink interface for chat and exam events.
pub trait EventSink: Send + Sync {
    /// Emit an event to downstream listeners.
    fn emit(&self, event: EventMsg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn event_payload_uses_tagged_layout() {
        let event = EventMsg::new(
            Uuid::nil(),
            EventPayload::ViolationRecorded {
                count: 2,
                reason: "Focus lost".to_string(),
            },
        );
        let encoded = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            encoded["payload"],
            json!({ "type": "violation_recorded", "payload": { "count": 2, "reason": "Focus lost" } })
        );
    }

    #[test]
    fn exam_phase_serializes_upper_case() {
        let encoded = serde_json::to_value(EventPayload::ExamPhaseChanged {
            from: ExamPhase::Setup,
            to: ExamPhase::Exam,
        })
        .expect("serialize");
        assert_eq!(encoded["payload"], json!({ "from": "SETUP", "to": "EXAM" }));
    }
}
