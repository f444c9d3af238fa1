//! Completion backends behind a uniform streaming interface.

mod autoagents;
mod gemini;
mod ollama;

pub use autoagents::AutoAgentsBackend;
pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;

use super::profile::ProviderProfile;
use crate::types::{ChatRole, ImageAttachment};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use studyos_rs_protocol::{ProviderKind, StreamFragment};
use thiserror::Error;

/// Stream of fragments produced by one backend call.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<StreamFragment, BackendError>> + Send>>;

/// Errors raised by a backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success response from the provider.
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// Error reported by the provider client library.
    #[error("provider error: {0}")]
    Provider(String),
    /// The profile lacks what the backend needs.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// One conversational turn sent to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: ChatRole,
    pub text: String,
    pub image: Option<ImageAttachment>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
            image: None,
        }
    }
}

/// Provider-neutral completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    pub model: String,
    pub system: Option<String>,
    pub turns: Vec<Turn>,
    pub temperature: f32,
    /// JSON schema the response must follow.
    pub json_schema: Option<Value>,
    pub web_search: bool,
    pub thinking_budget: Option<u32>,
}

impl BackendRequest {
    /// Single user turn with default sampling.
    pub fn prompt(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            turns: vec![Turn::user(text)],
            temperature: 0.7,
            json_schema: None,
            web_search: false,
            thinking_budget: None,
        }
    }
}

/// A provider that can stream completions.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Start a streaming completion.
    async fn stream(&self, request: BackendRequest) -> Result<FragmentStream, BackendError>;

    /// Complete a request and return the concatenated text.
    async fn complete(&self, request: BackendRequest) -> Result<String, BackendError> {
        let mut stream = self.stream(request).await?;
        let mut text = String::new();
        while let Some(fragment) = stream.next().await {
            text.push_str(&fragment?.text);
        }
        Ok(text)
    }
}

/// Builds a backend for a usable provider profile.
pub trait BackendFactory: Send + Sync {
    fn create(&self, profile: &ProviderProfile) -> Result<Arc<dyn CompletionBackend>, BackendError>;
}

/// Factory for the real HTTP and client-library backends.
#[derive(Clone)]
pub struct DefaultBackendFactory {
    client: reqwest::Client,
}

impl DefaultBackendFactory {
    pub fn new() -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl BackendFactory for DefaultBackendFactory {
    fn create(&self, profile: &ProviderProfile) -> Result<Arc<dyn CompletionBackend>, BackendError> {
        let credential = || {
            profile
                .credential
                .clone()
                .ok_or_else(|| BackendError::Configuration(format!("{} credential missing", profile.kind)))
        };
        let base_url = || {
            profile
                .base_url
                .clone()
                .ok_or_else(|| BackendError::Configuration(format!("{} base url missing", profile.kind)))
        };
        let backend: Arc<dyn CompletionBackend> = match profile.kind {
            ProviderKind::Gemini => Arc::new(GeminiBackend::new(
                self.client.clone(),
                base_url()?,
                credential()?,
            )),
            ProviderKind::Ollama => Arc::new(OllamaBackend::new(self.client.clone(), base_url()?)),
            ProviderKind::OpenAi | ProviderKind::Anthropic => Arc::new(AutoAgentsBackend::new(
                profile.kind,
                credential()?,
                profile.base_url.clone(),
            )),
        };
        Ok(backend)
    }
}
