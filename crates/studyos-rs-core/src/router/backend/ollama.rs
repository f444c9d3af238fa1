//! Local Ollama backend over the `/api/chat` NDJSON stream.

use super::{BackendError, BackendRequest, CompletionBackend, FragmentStream};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use studyos_rs_protocol::{ProviderKind, StreamFragment};

pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaBackend {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn send(&self, body: &OllamaRequest) -> Result<reqwest::Response, BackendError> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(body)
            .send()
            .await?;
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

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Value>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaChunkMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaChunkMessage {
    #[serde(default)]
    content: String,
}

fn build_request(request: &BackendRequest, stream: bool) -> OllamaRequest {
    let mut messages = Vec::with_capacity(request.turns.len() + 1);
    if let Some(system) = &request.system {
        messages.push(OllamaMessage {
            role: "system",
            content: system.clone(),
            images: Vec::new(),
        });
    }
    messages.extend(request.turns.iter().map(|turn| OllamaMessage {
        role: turn.role.as_str(),
        content: turn.text.clone(),
        images: turn
            .image
            .iter()
            .map(|image| image.base64_data().to_string())
            .collect(),
    }));
    OllamaRequest {
        model: request.model.clone(),
        messages,
        stream,
        options: OllamaOptions {
            temperature: request.temperature,
        },
        format: request.json_schema.clone(),
    }
}

fn parse_line(line: &str) -> Result<StreamFragment, BackendError> {
    let chunk: OllamaChunk = serde_json::from_str(line)
        .map_err(|err| BackendError::Decode(format!("ollama chunk: {err}")))?;
    if let Some(error) = chunk.error {
        return Err(BackendError::Provider(error));
    }
    Ok(StreamFragment::text(
        chunk.message.map(|message| message.content).unwrap_or_default(),
    ))
}

#[async_trait]
impl CompletionBackend for OllamaBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    async fn stream(&self, request: BackendRequest) -> Result<FragmentStream, BackendError> {
        debug!(
            "starting ollama stream (model={}, turns={})",
            request.model,
            request.turns.len()
        );
        let response = self.send(&build_request(&request, true)).await?;

        struct State<S> {
            bytes: S,
            carry: Vec<u8>,
            buffer: String,
            pending: VecDeque<Result<StreamFragment, BackendError>>,
            done: bool,
        }

        let state = State {
            bytes: Box::pin(response.bytes_stream()),
            carry: Vec::new(),
            buffer: String::new(),
            pending: VecDeque::new(),
            done: false,
        };
        let fragments = stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    if item.is_err() {
                        state.pending.clear();
                        state.done = true;
                    }
                    return Some((item, state));
                }
                if state.done {
                    return None;
                }
                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        let text = drain_utf8(&mut state.carry, &chunk);
                        state.buffer.push_str(&text);
                        while let Some(pos) = state.buffer.find('\n') {
                            let line: String = state.buffer.drain(..=pos).collect();
                            if !line.trim().is_empty() {
                                state.pending.push_back(parse_line(line.trim()));
                            }
                        }
                    }
                    Some(Err(err)) => {
                        state.done = true;
                        return Some((Err(BackendError::Http(err)), state));
                    }
                    None => {
                        state.done = true;
                        let rest = std::mem::take(&mut state.buffer);
                        if !rest.trim().is_empty() {
                            state.pending.push_back(parse_line(rest.trim()));
                        }
                    }
                }
            }
        })
        .filter(|item| {
            let keep = !matches!(item, Ok(fragment) if fragment.is_empty());
            async move { keep }
        });
        Ok(Box::pin(fragments))
    }

    async fn complete(&self, request: BackendRequest) -> Result<String, BackendError> {
        let response = self.send(&build_request(&request, false)).await?;
        let body = response.text().await?;
        Ok(parse_line(body.trim())?.text)
    }
}

/// Append `chunk` to `carry` and take the longest valid UTF-8 prefix.
///
/// A multi-byte character split across network chunks stays in `carry`.
fn drain_utf8(carry: &mut Vec<u8>, chunk: &[u8]) -> String {
    carry.extend_from_slice(chunk);
    let valid = match std::str::from_utf8(carry) {
        Ok(text) => text.len(),
        Err(err) if err.error_len().is_none() => err.valid_up_to(),
        Err(_) => {
            let text = String::from_utf8_lossy(carry).into_owned();
            carry.clear();
            return text;
        }
    };
    let rest = carry.split_off(valid);
    let text = String::from_utf8_lossy(carry).into_owned();
    *carry = rest;
    text
}
