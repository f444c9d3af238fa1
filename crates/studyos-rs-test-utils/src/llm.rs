//! Scripted `autoagents-llm` provider for exercising the autoagents backend.

use async_trait::async_trait;
use autoagents_llm::chat::{ChatMessage, ChatProvider, ChatResponse, StructuredOutputFormat, Tool};
use autoagents_llm::completion::{CompletionProvider, CompletionRequest, CompletionResponse};
use autoagents_llm::embedding::EmbeddingProvider;
use autoagents_llm::error::LLMError;
use autoagents_llm::models::ModelsProvider;
use autoagents_llm::{LLMProvider, ToolCall};
use futures_util::{Stream, stream};
use parking_lot::Mutex;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

type TextStream = Pin<Box<dyn Stream<Item = Result<String, LLMError>> + Send>>;

#[derive(Debug, Clone)]
enum Script {
    /// Stream these chunks; non-streaming calls get them joined.
    Chunks(Vec<String>),
    /// Fail every call with a provider error.
    Fail(String),
}

/// Fake provider that replays a script and records what it was sent.
#[derive(Debug, Clone)]
pub struct ScriptedLLM {
    script: Script,
    pub last_messages: Arc<Mutex<Vec<ChatMessage>>>,
    pub last_schema: Arc<Mutex<Option<StructuredOutputFormat>>>,
}

impl ScriptedLLM {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            last_messages: Arc::default(),
            last_schema: Arc::default(),
        }
    }

    pub fn streaming<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_script(Script::Chunks(chunks.into_iter().map(Into::into).collect()))
    }

    /// Single reply for both streaming and non-streaming calls.
    pub fn replying(text: impl Into<String>) -> Self {
        Self::streaming([text.into()])
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_script(Script::Fail(message.into()))
    }

    fn record(&self, messages: &[ChatMessage], schema: Option<StructuredOutputFormat>) {
        *self.last_messages.lock() = messages.to_vec();
        *self.last_schema.lock() = schema;
    }

    fn reply(&self) -> Result<String, LLMError> {
        match &self.script {
            Script::Chunks(chunks) => Ok(chunks.concat()),
            Script::Fail(message) => Err(LLMError::ProviderError(message.clone())),
        }
    }
}

/// Plain-text chat response.
#[derive(Debug, Clone)]
pub struct TextResponse(pub String);

impl fmt::Display for TextResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl ChatResponse for TextResponse {
    fn text(&self) -> Option<String> {
        Some(self.0.clone())
    }

    fn tool_calls(&self) -> Option<Vec<ToolCall>> {
        None
    }
}

#[async_trait]
impl ChatProvider for ScriptedLLM {
    async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        _tools: Option<&[Tool]>,
        json_schema: Option<StructuredOutputFormat>,
    ) -> Result<Box<dyn ChatResponse>, LLMError> {
        self.record(messages, json_schema);
        Ok(Box::new(TextResponse(self.reply()?)))
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        json_schema: Option<StructuredOutputFormat>,
    ) -> Result<TextStream, LLMError> {
        self.record(messages, json_schema);
        match &self.script {
            Script::Chunks(chunks) => {
                let items: Vec<Result<String, LLMError>> = chunks.iter().cloned().map(Ok).collect();
                Ok(Box::pin(stream::iter(items)))
            }
            Script::Fail(message) => Err(LLMError::ProviderError(message.clone())),
        }
    }
}

#[async_trait]
impl CompletionProvider for ScriptedLLM {
    async fn complete(
        &self,
        _req: &CompletionRequest,
        _json_schema: Option<StructuredOutputFormat>,
    ) -> Result<CompletionResponse, LLMError> {
        Ok(CompletionResponse { text: self.reply()? })
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedLLM {
    async fn embed(&self, _input: Vec<String>) -> Result<Vec<Vec<f32>>, LLMError> {
        Err(LLMError::ProviderError("embeddings are not scripted".to_string()))
    }
}

#[async_trait]
impl ModelsProvider for ScriptedLLM {}

impl LLMProvider for ScriptedLLM {}
