//! Google Gemini backend over the `generateContent` REST API.

use super::{BackendError, BackendRequest, CompletionBackend, FragmentStream, Turn};
use crate::types::ChatRole;
use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::StreamExt;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use studyos_rs_protocol::{GroundingLink, ProviderKind, StreamFragment};

/// Gemini REST client; the model is taken from each request.
pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiBackend {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    async fn send(&self, url: String, body: &GeminiRequest, sse: bool) -> Result<reqwest::Response, BackendError> {
        let mut request = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body);
        if sse {
            request = request.header("Accept", "text/event-stream");
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionBackend for GeminiBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn stream(&self, request: BackendRequest) -> Result<FragmentStream, BackendError> {
        let body = build_request(&request);
        debug!(
            "starting gemini stream (model={}, turns={}, web_search={})",
            request.model,
            body.contents.len(),
            request.web_search
        );
        let url = format!("{}?alt=sse", self.url(&request.model, "streamGenerateContent"));
        let response = self.send(url, &body, true).await?;
        let fragments = response.bytes_stream().eventsource().filter_map(|event| async move {
            match event {
                Ok(event) if event.data.trim().is_empty() => None,
                Ok(event) => match parse_chunk(&event.data) {
                    Ok(fragment) if fragment.is_empty() => None,
                    other => Some(other),
                },
                Err(EventStreamError::Transport(err)) => Some(Err(BackendError::Http(err))),
                Err(err) => Some(Err(BackendError::Decode(err.to_string()))),
            }
        });
        Ok(Box::pin(fragments))
    }

    async fn complete(&self, request: BackendRequest) -> Result<String, BackendError> {
        let body = build_request(&request);
        let response = self
            .send(self.url(&request.model, "generateContent"), &body, false)
            .await?;
        let text = response.text().await?;
        Ok(parse_chunk(&text)?.text)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Other(Value),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    #[serde(default)]
    uri: String,
    #[serde(default)]
    title: String,
}

fn convert_turn(turn: &Turn) -> GeminiContent {
    let role = match turn.role {
        ChatRole::User => "user",
        ChatRole::Assistant => "model",
    };
    let mut parts = Vec::new();
    if let Some(image) = &turn.image {
        parts.push(GeminiPart::InlineData {
            inline_data: InlineData {
                mime_type: image.mime_type().to_string(),
                data: image.base64_data().to_string(),
            },
        });
    }
    parts.push(GeminiPart::Text {
        text: turn.text.clone(),
    });
    GeminiContent {
        role: Some(role.to_string()),
        parts,
    }
}

fn build_request(request: &BackendRequest) -> GeminiRequest {
    GeminiRequest {
        contents: request.turns.iter().map(convert_turn).collect(),
        system_instruction: request.system.as_ref().map(|system| GeminiContent {
            role: None,
            parts: vec![GeminiPart::Text {
                text: system.clone(),
            }],
        }),
        tools: request
            .web_search
            .then(|| vec![serde_json::json!({ "googleSearch": {} })]),
        generation_config: GenerationConfig {
            temperature: request.temperature,
            thinking_config: request
                .thinking_budget
                .map(|thinking_budget| ThinkingConfig { thinking_budget }),
            response_mime_type: request.json_schema.as_ref().map(|_| "application/json"),
            response_schema: request.json_schema.clone(),
        },
    }
}

/// Decode one response object into text plus grounding links.
fn parse_chunk(data: &str) -> Result<StreamFragment, BackendError> {
    let response: GeminiResponse = serde_json::from_str(data)
        .map_err(|err| BackendError::Decode(format!("gemini chunk: {err}")))?;
    let mut fragment = StreamFragment::default();
    if let Some(candidate) = response.candidates.into_iter().next() {
        if let Some(content) = candidate.content {
            for part in content.parts {
                if let GeminiPart::Text { text } = part {
                    fragment.text.push_str(&text);
                }
            }
        }
        if let Some(metadata) = candidate.grounding_metadata {
            fragment.grounding = metadata
                .grounding_chunks
                .into_iter()
                .filter_map(|chunk| chunk.web)
                .map(|web| GroundingLink {
                    title: web.title,
                    uri: web.uri,
                })
                .collect();
        }
    }
    Ok(fragment)
}

#[cfg(test)]
mod tests {
    use super::{build_request, parse_chunk};
    use crate::router::backend::{BackendRequest, Turn};
    use crate::types::{ChatRole, ImageAttachment};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn request_carries_search_thinking_and_inline_image() {
        let mut request = BackendRequest::prompt("gemini-3-flash-preview", "describe this");
        request.system = Some("be brief".to_string());
        request.web_search = true;
        request.thinking_budget = Some(2048);
        request.turns[0].image = Some(ImageAttachment::new("data:image/png;base64,AAAA"));
        request.turns.insert(
            0,
            Turn {
                role: ChatRole::Assistant,
                text: "hello".to_string(),
                image: None,
            },
        );

        let body = serde_json::to_value(build_request(&request)).expect("serialize");
        assert_eq!(body["contents"][0]["role"], json!("model"));
        assert_eq!(
            body["contents"][1]["parts"][0],
            json!({ "inlineData": { "mimeType": "image/png", "data": "AAAA" } })
        );
        assert_eq!(body["contents"][1]["parts"][1], json!({ "text": "describe this" }));
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], json!("be brief"));
        assert_eq!(body["tools"], json!([{ "googleSearch": {} }]));
        assert_eq!(
            body["generationConfig"]["thinkingConfig"],
            json!({ "thinkingBudget": 2048 })
        );
        assert!(body["generationConfig"].get("responseSchema").is_none());
    }

    #[test]
    fn structured_output_sets_mime_type() {
        let mut request = BackendRequest::prompt("m", "list");
        request.json_schema = Some(json!({ "type": "ARRAY" }));
        let body = serde_json::to_value(build_request(&request)).expect("serialize");
        assert_eq!(body["generationConfig"]["responseMimeType"], json!("application/json"));
        assert_eq!(body["generationConfig"]["responseSchema"], json!({ "type": "ARRAY" }));
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn chunk_yields_text_and_web_grounding() {
        let data = json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Osmo" }, { "text": "sis" }] },
                "groundingMetadata": {
                    "groundingChunks": [
                        { "web": { "uri": "https://a.example", "title": "A" } },
                        { "retrievedContext": {} }
                    ]
                }
            }]
        })
        .to_string();
        let fragment = parse_chunk(&data).expect("chunk");
        assert_eq!(fragment.text, "Osmosis");
        assert_eq!(fragment.grounding.len(), 1);
        assert_eq!(fragment.grounding[0].uri, "https://a.example");
    }

    #[test]
    fn malformed_chunk_is_a_decode_error() {
        assert!(parse_chunk("{not json").is_err());
        assert!(parse_chunk("{}").expect("empty").is_empty());
    }
}
