//! Transcript message types shared by the router and chat controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use studyos_rs_protocol::{AgentRole, GroundingLink, MessageId};
use uuid::Uuid;

/// Greeting seeded into an empty transcript.
pub const WELCOME_TEXT: &str = "Welcome to your Study Universe. I am The Council. I will route your queries to the best agent. Try asking for a strict mark scheme check (Examiner) or a simple analogy (Teacher).";

/// Speaker role for a transcript message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    /// Return the role as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// Image attached to a user message, carried as a `data:` URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageAttachment {
    pub data_url: String,
}

impl ImageAttachment {
    pub fn new(data_url: impl Into<String>) -> Self {
        Self {
            data_url: data_url.into(),
        }
    }

    /// PNG when the URL says so, JPEG otherwise.
    pub fn mime_type(&self) -> &'static str {
        if self.data_url.starts_with("data:image/png") {
            "image/png"
        } else {
            "image/jpeg"
        }
    }

    /// Base64 payload after the comma of the data URL.
    pub fn base64_data(&self) -> &str {
        self.data_url
            .split_once(',')
            .map(|(_, data)| data)
            .unwrap_or(&self.data_url)
    }
}

/// A single transcript entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: ChatRole,
    /// Persona that produced an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<AgentRole>,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageAttachment>,
    /// Citations merged from grounding fragments, unique by URI.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grounding: Vec<GroundingLink>,
    /// Set only on the in-flight assistant reply.
    #[serde(default)]
    pub is_streaming: bool,
}

impl ChatMessage {
    /// User message with an optional image.
    pub fn user(text: impl Into<String>, image: Option<ImageAttachment>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: ChatRole::User,
            persona: None,
            text: text.into(),
            created_at: Utc::now(),
            image,
            grounding: Vec::new(),
            is_streaming: false,
        }
    }

    /// Empty assistant message that receives streamed fragments.
    pub fn placeholder(persona: AgentRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: ChatRole::Assistant,
            persona: Some(persona),
            text: String::new(),
            created_at: Utc::now(),
            image: None,
            grounding: Vec::new(),
            is_streaming: true,
        }
    }

    pub fn welcome() -> Self {
        Self {
            id: Uuid::new_v4(),
            role: ChatRole::Assistant,
            persona: Some(AgentRole::Council),
            text: WELCOME_TEXT.to_string(),
            created_at: Utc::now(),
            image: None,
            grounding: Vec::new(),
            is_streaming: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatMessage, ChatRole, ImageAttachment};
    use pretty_assertions::assert_eq;
    use studyos_rs_protocol::AgentRole;

    #[test]
    fn image_mime_defaults_to_jpeg() {
        let png = ImageAttachment::new("data:image/png;base64,AAAA");
        let jpeg = ImageAttachment::new("data:image/jpeg;base64,BBBB");
        let webp = ImageAttachment::new("data:image/webp;base64,CCCC");
        assert_eq!(png.mime_type(), "image/png");
        assert_eq!(jpeg.mime_type(), "image/jpeg");
        assert_eq!(webp.mime_type(), "image/jpeg");
        assert_eq!(png.base64_data(), "AAAA");
    }

    #[test]
    fn placeholder_starts_streaming_and_empty() {
        let message = ChatMessage::placeholder(AgentRole::Examiner);
        assert_eq!(message.role, ChatRole::Assistant);
        assert_eq!(message.persona, Some(AgentRole::Examiner));
        assert!(message.is_streaming);
        assert!(message.text.is_empty());
    }
}
