//! OpenAI and Anthropic backends through `autoagents-llm` providers.

use super::{BackendError, BackendRequest, CompletionBackend, FragmentStream};
use crate::types::ChatRole;
use async_trait::async_trait;
use autoagents_llm::LLMProvider;
use autoagents_llm::backends::anthropic::Anthropic;
use autoagents_llm::backends::openai::OpenAI;
use autoagents_llm::builder::LLMBuilder;
use autoagents_llm::chat::{ChatMessage, ChatRole as LlmRole, MessageType, StructuredOutputFormat};
use futures_util::StreamExt;
use log::debug;
use std::sync::Arc;
use studyos_rs_protocol::{ProviderKind, StreamFragment};

enum Source {
    /// Build a client per request so model and temperature follow the request.
    Credentials {
        api_key: String,
        base_url: Option<String>,
    },
    /// Pre-built provider; request model and temperature are ignored.
    Provider(Arc<dyn LLMProvider>),
}

/// Backend for the credentialed kinds served by `autoagents-llm`.
pub struct AutoAgentsBackend {
    kind: ProviderKind,
    source: Source,
}

impl AutoAgentsBackend {
    pub fn new(kind: ProviderKind, api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            kind,
            source: Source::Credentials {
                api_key: api_key.into(),
                base_url,
            },
        }
    }

    /// Wrap an existing provider.
    pub fn from_provider(kind: ProviderKind, llm: Arc<dyn LLMProvider>) -> Self {
        Self {
            kind,
            source: Source::Provider(llm),
        }
    }

    fn provider(&self, request: &BackendRequest) -> Result<Arc<dyn LLMProvider>, BackendError> {
        let (api_key, base_url) = match &self.source {
            Source::Provider(llm) => return Ok(llm.clone()),
            Source::Credentials { api_key, base_url } => (api_key.clone(), base_url.clone()),
        };
        macro_rules! build {
            ($backend:ty) => {{
                let mut builder = LLMBuilder::<$backend>::new()
                    .api_key(api_key)
                    .model(request.model.clone())
                    .temperature(request.temperature);
                if let Some(system) = &request.system {
                    builder = builder.system(system.clone());
                }
                if let Some(base_url) = base_url {
                    builder = builder.base_url(base_url);
                }
                let llm: Arc<dyn LLMProvider> = builder
                    .build()
                    .map_err(|err| BackendError::Provider(err.to_string()))?;
                llm
            }};
        }
        let llm = match self.kind {
            ProviderKind::OpenAi => build!(OpenAI),
            ProviderKind::Anthropic => build!(Anthropic),
            other => {
                return Err(BackendError::Configuration(format!(
                    "{other} is not served by autoagents-llm"
                )));
            }
        };
        Ok(llm)
    }

    fn messages(&self, request: &BackendRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(request.turns.len() + 1);
        // Pre-built providers carry no system prompt of their own.
        if let (Source::Provider(_), Some(system)) = (&self.source, &request.system) {
            messages.push(ChatMessage {
                role: LlmRole::User,
                message_type: MessageType::Text,
                content: system.clone(),
            });
        }
        for turn in &request.turns {
            let role = match turn.role {
                ChatRole::User => LlmRole::User,
                ChatRole::Assistant => LlmRole::Assistant,
            };
            if let Some(image) = &turn.image {
                messages.push(ChatMessage {
                    role: role.clone(),
                    message_type: MessageType::ImageURL(image.data_url.clone()),
                    content: String::new(),
                });
            }
            messages.push(ChatMessage {
                role,
                message_type: MessageType::Text,
                content: turn.text.clone(),
            });
        }
        messages
    }
}

fn output_format(request: &BackendRequest) -> Option<StructuredOutputFormat> {
    request
        .json_schema
        .as_ref()
        .map(|schema| StructuredOutputFormat {
            name: "response".to_string(),
            description: None,
            schema: Some(schema.clone()),
            strict: Some(false),
        })
}

#[async_trait]
impl CompletionBackend for AutoAgentsBackend {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn stream(&self, request: BackendRequest) -> Result<FragmentStream, BackendError> {
        let llm = self.provider(&request)?;
        let messages = self.messages(&request);
        debug!(
            "starting llm stream (kind={}, model={}, messages={})",
            self.kind,
            request.model,
            messages.len()
        );
        let stream = llm
            .chat_stream(&messages, output_format(&request))
            .await
            .map_err(|err| BackendError::Provider(err.to_string()))?;
        let fragments = stream.map(|item| {
            item.map(StreamFragment::text)
                .map_err(|err| BackendError::Provider(err.to_string()))
        });
        Ok(Box::pin(fragments))
    }

    async fn complete(&self, request: BackendRequest) -> Result<String, BackendError> {
        let llm = self.provider(&request)?;
        let messages = self.messages(&request);
        let response = llm
            .chat_with_tools(&messages, None, output_format(&request))
            .await
            .map_err(|err| BackendError::Provider(err.to_string()))?;
        Ok(response.text().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::AutoAgentsBackend;
    use crate::router::backend::{BackendRequest, CompletionBackend};
    use autoagents_llm::LLMProvider;
    use autoagents_llm::chat::MessageType;
    use futures_util::StreamExt;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use studyos_rs_protocol::ProviderKind;
    use serde_json::json;
    use studyos_rs_test_utils::ScriptedLLM;

    #[tokio::test]
    async fn streams_chunks_from_wrapped_provider() {
        let llm: Arc<dyn LLMProvider> = Arc::new(ScriptedLLM::streaming(["Mito", "chondria"]));
        let backend = AutoAgentsBackend::from_provider(ProviderKind::OpenAi, llm);
        let mut stream = backend
            .stream(BackendRequest::prompt("gpt-4.1", "powerhouse?"))
            .await
            .expect("stream");
        let mut text = String::new();
        while let Some(fragment) = stream.next().await {
            text.push_str(&fragment.expect("fragment").text);
        }
        assert_eq!(text, "Mitochondria");
    }

    #[tokio::test]
    async fn provider_failure_surfaces_as_backend_error() {
        let llm: Arc<dyn LLMProvider> = Arc::new(ScriptedLLM::failing("quota exhausted"));
        let backend = AutoAgentsBackend::from_provider(ProviderKind::Anthropic, llm);
        let err = match backend.stream(BackendRequest::prompt("m", "hi")).await {
            Ok(_) => panic!("stream should fail"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("quota exhausted"));
    }

    #[tokio::test]
    async fn complete_prepends_system_and_forwards_schema() {
        let llm = ScriptedLLM::replying("{\"score\":3}");
        let messages = llm.last_messages.clone();
        let schema = llm.last_schema.clone();
        let backend = AutoAgentsBackend::from_provider(ProviderKind::OpenAi, Arc::new(llm));
        let mut request = BackendRequest::prompt("gpt-4.1", "grade this");
        request.system = Some("strict examiner".to_string());
        request.json_schema = Some(json!({ "type": "object" }));

        let text = backend.complete(request).await.expect("complete");
        assert_eq!(text, "{\"score\":3}");
        let seen = messages.lock().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].content, "strict examiner");
        assert_eq!(seen[1].content, "grade this");
        let format = schema.lock().clone().expect("schema");
        assert_eq!(format.schema, Some(json!({ "type": "object" })));
    }

    #[test]
    fn image_turn_becomes_image_url_message() {
        let backend = AutoAgentsBackend::new(ProviderKind::OpenAi, "sk-test", None);
        let mut request = BackendRequest::prompt("gpt-4.1", "what is shown?");
        request.system = Some("tutor".to_string());
        request.turns[0].image = Some(crate::types::ImageAttachment::new(
            "data:image/png;base64,AAAA",
        ));
        let messages = backend.messages(&request);
        assert_eq!(messages.len(), 2);
        assert!(matches!(
            &messages[0].message_type,
            MessageType::ImageURL(url) if url == "data:image/png;base64,AAAA"
        ));
        assert_eq!(messages[1].content, "what is shown?");
    }
}
