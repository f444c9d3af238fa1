//! Provider routing: profile management, resolution, and cancelable streaming.

pub mod backend;
mod profile;

pub use backend::{
    AutoAgentsBackend, BackendError, BackendFactory, BackendRequest, CompletionBackend,
    DefaultBackendFactory, FragmentStream, GeminiBackend, OllamaBackend, Turn,
};
pub use profile::{ProviderProfile, Resolution, ResolvedProvider, resolve};

use crate::error::CoreError;
use crate::prompt;
use crate::state::{PreferenceStore, ProviderOverrides, StoredPreferences};
use crate::types::{ChatMessage, ChatRole};
use futures_util::{Stream, StreamExt};
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use studyos_rs_config::StudyOsConfig;
use studyos_rs_protocol::{
    AgentRole, CredentialOrigin, DigitalTwin, FeatureFlags, FileDocument, ProviderKind,
    RoutingPreference, StreamFragment,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

const FRAGMENT_BUFFER: usize = 64;

/// One runtime setting for a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderSetting {
    Credential(String),
    BaseUrl(String),
    Model(String),
}

impl ProviderSetting {
    fn name(&self) -> &'static str {
        match self {
            ProviderSetting::Credential(_) => "credential",
            ProviderSetting::BaseUrl(_) => "base_url",
            ProviderSetting::Model(_) => "model",
        }
    }
}

/// Per-kind row of a router status snapshot.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProviderStatus {
    pub kind: ProviderKind,
    pub usable: bool,
    pub origin: CredentialOrigin,
    /// Whether this kind serves the next request.
    pub resolved: bool,
    /// Web search would take effect: this kind serves the next request and supports it.
    pub web_search_actionable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Snapshot of routing state.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RouterStatus {
    pub preference: RoutingPreference,
    pub resolved: ResolvedProvider,
    /// Whether the web-search flag affects the next request.
    pub web_search_actionable: bool,
    pub providers: Vec<ProviderStatus>,
}

/// Tutor request routed to the resolved provider.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Transcript so far; the last entry is the new user message.
    pub history: Vec<ChatMessage>,
    pub persona: AgentRole,
    pub twin: Option<DigitalTwin>,
    pub files: Vec<FileDocument>,
    pub flags: FeatureFlags,
}

/// Non-streaming request used by content generators.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub turns: Vec<Turn>,
    pub system: Option<String>,
    pub json_schema: Option<Value>,
    pub temperature: f32,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::user(prompt)],
            system: None,
            json_schema: None,
            temperature: 0.7,
        }
    }

    /// Prepend a context turn ahead of the prompt.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.turns.insert(0, Turn::user(context));
        self
    }

    /// Request JSON output following the schema.
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.json_schema = Some(schema);
        self
    }
}

/// How a streaming completion ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Completed,
    /// The token fired; nothing was emitted after it.
    Cancelled,
    /// An error was reported to the consumer as a terminal fragment.
    Failed(String),
}

/// Handle for a running streaming completion.
pub struct CompletionStream {
    /// Provider chosen for this call.
    pub provider: ResolvedProvider,
    fragments: ReceiverStream<StreamFragment>,
    handle: JoinHandle<CompletionOutcome>,
}

impl CompletionStream {
    /// Wait for the producing task and return how it ended.
    pub async fn finish(self) -> CompletionOutcome {
        drop(self.fragments);
        self.handle
            .await
            .unwrap_or_else(|err| CompletionOutcome::Failed(err.to_string()))
    }
}

impl Stream for CompletionStream {
    type Item = StreamFragment;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.fragments).poll_next(cx)
    }
}

#[derive(Debug, Clone, Default)]
struct ProviderSlot {
    env_credential: Option<String>,
    env_base_url: Option<String>,
    env_model: Option<String>,
    lite_model: Option<String>,
    runtime: ProviderOverrides,
}

impl ProviderSlot {
    fn profile(&self, kind: ProviderKind) -> ProviderProfile {
        let (credential, origin) = match (&self.runtime.credential, &self.env_credential) {
            (Some(value), _) => (Some(value.clone()), CredentialOrigin::Runtime),
            (None, Some(value)) => (Some(value.clone()), CredentialOrigin::Environment),
            (None, None) => (None, CredentialOrigin::None),
        };
        ProviderProfile {
            kind,
            credential,
            origin,
            base_url: self.runtime.base_url.clone().or_else(|| self.env_base_url.clone()),
            model: self.runtime.model.clone().or_else(|| self.env_model.clone()),
            lite_model: self.lite_model.clone(),
        }
    }
}

struct RouterState {
    preference: RoutingPreference,
    slots: BTreeMap<ProviderKind, ProviderSlot>,
}

impl RouterState {
    fn profiles(&self) -> Vec<ProviderProfile> {
        ProviderKind::ALL
            .into_iter()
            .map(|kind| self.slots.get(&kind).cloned().unwrap_or_default().profile(kind))
            .collect()
    }

    fn stored(&self) -> StoredPreferences {
        StoredPreferences {
            preference: self.preference,
            overrides: self
                .slots
                .iter()
                .filter(|(_, slot)| !slot.runtime.is_empty())
                .map(|(kind, slot)| (*kind, slot.runtime.clone()))
                .collect(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Routes tutor and generator requests to one of the configured providers.
pub struct ProviderRouter {
    factory: Arc<dyn BackendFactory>,
    state: RwLock<RouterState>,
    store: Option<Arc<dyn PreferenceStore>>,
}

impl ProviderRouter {
    /// Build from config, reading credentials from the process environment.
    pub fn from_config(config: &StudyOsConfig, factory: Arc<dyn BackendFactory>) -> Self {
        Self::from_config_with_env(config, factory, |name| std::env::var(name).ok())
    }

    /// Build from config with an injectable environment lookup.
    pub fn from_config_with_env(
        config: &StudyOsConfig,
        factory: Arc<dyn BackendFactory>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let slots = ProviderKind::ALL
            .into_iter()
            .map(|kind| {
                let settings = config.providers.resolved(kind);
                let env_credential = non_blank(settings.api_key.clone()).or_else(|| {
                    settings
                        .api_key_env
                        .iter()
                        .find_map(|name| non_blank(env(name)))
                });
                let env_base_url = settings
                    .base_url_env
                    .as_deref()
                    .and_then(|name| non_blank(env(name)))
                    .or(non_blank(settings.base_url));
                let env_model = settings
                    .model_env
                    .as_deref()
                    .and_then(|name| non_blank(env(name)))
                    .or(non_blank(settings.model));
                let slot = ProviderSlot {
                    env_credential,
                    env_base_url,
                    env_model,
                    lite_model: non_blank(settings.lite_model),
                    runtime: ProviderOverrides::default(),
                };
                (kind, slot)
            })
            .collect();
        let router = Self {
            factory,
            state: RwLock::new(RouterState {
                preference: config.routing.preference,
                slots,
            }),
            store: None,
        };
        let status = router.status();
        info!(
            "built provider router (preference={}, resolved={}, usable={})",
            status.preference,
            status.resolved.kind,
            status
                .providers
                .iter()
                .filter(|provider| provider.usable)
                .map(|provider| provider.kind.as_str())
                .collect::<Vec<_>>()
                .join(",")
        );
        router
    }

    /// Attach a preference store, applying anything it already holds.
    pub fn with_preference_store(mut self, store: Arc<dyn PreferenceStore>) -> Self {
        match store.load() {
            Ok(Some(stored)) => {
                let mut state = self.state.write();
                state.preference = stored.preference;
                for (kind, overrides) in stored.overrides {
                    state.slots.entry(kind).or_default().runtime = overrides;
                }
                info!(
                    "restored router preferences (preference={})",
                    state.preference
                );
            }
            Ok(None) => {}
            Err(err) => warn!("failed to load router preferences (error={})", err),
        }
        self.store = Some(store);
        self
    }

    pub fn preference(&self) -> RoutingPreference {
        self.state.read().preference
    }

    /// Change the routing preference and persist it.
    pub fn set_preference(&self, preference: RoutingPreference) {
        {
            let mut state = self.state.write();
            state.preference = preference;
        }
        info!("routing preference changed (preference={})", preference);
        self.persist();
    }

    /// Apply a runtime setting to one provider. An empty value clears the override.
    pub fn configure(&self, kind: ProviderKind, setting: ProviderSetting) -> Result<(), CoreError> {
        let name = setting.name();
        if matches!(setting, ProviderSetting::Credential(_)) && !kind.needs_credential() {
            return Err(CoreError::UnsupportedSetting {
                kind,
                setting: name,
            });
        }
        let origin = {
            let mut state = self.state.write();
            let slot = state.slots.entry(kind).or_default();
            match setting {
                ProviderSetting::Credential(value) => slot.runtime.credential = non_blank(Some(value)),
                ProviderSetting::BaseUrl(value) => slot.runtime.base_url = non_blank(Some(value)),
                ProviderSetting::Model(value) => slot.runtime.model = non_blank(Some(value)),
            }
            slot.profile(kind).origin
        };
        info!(
            "configured provider (kind={}, setting={}, origin={:?})",
            kind, name, origin
        );
        self.persist();
        Ok(())
    }

    /// Effective profile for a kind.
    pub fn profile(&self, kind: ProviderKind) -> ProviderProfile {
        self.state
            .read()
            .slots
            .get(&kind)
            .cloned()
            .unwrap_or_default()
            .profile(kind)
    }

    /// Provider that would serve a request right now.
    pub fn resolve(&self) -> ResolvedProvider {
        let state = self.state.read();
        resolve(state.preference, &state.profiles())
    }

    pub fn status(&self) -> RouterStatus {
        let state = self.state.read();
        let profiles = state.profiles();
        let resolved = resolve(state.preference, &profiles);
        let web_search_actionable = resolved.usable && resolved.kind.supports_web_search();
        let providers = profiles
            .into_iter()
            .map(|profile| ProviderStatus {
                kind: profile.kind,
                usable: profile.is_usable(),
                origin: profile.origin,
                resolved: profile.kind == resolved.kind,
                web_search_actionable: web_search_actionable && profile.kind == resolved.kind,
                base_url: profile.base_url,
                model: profile.model,
            })
            .collect();
        RouterStatus {
            preference: state.preference,
            resolved,
            web_search_actionable,
            providers,
        }
    }

    /// Stream a tutor reply from the resolved provider.
    ///
    /// Errors never surface as `Err`: they arrive as one terminal fragment and
    /// the handle reports [`CompletionOutcome::Failed`].
    pub fn stream_completion(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> CompletionStream {
        let resolved = self.resolve();
        let profile = self.profile(resolved.kind);
        let (tx, rx) = mpsc::channel(FRAGMENT_BUFFER);
        let factory = self.factory.clone();
        debug!(
            "starting completion stream (provider={}, resolution={:?}, persona={}, history={})",
            resolved.kind,
            resolved.resolution,
            request.persona,
            request.history.len()
        );
        let handle = tokio::spawn(async move {
            if let Some(reason) = profile.unusable_reason() {
                warn!(
                    "streaming with unusable provider (provider={}, reason={})",
                    profile.kind, reason
                );
                let _ = tx
                    .send(StreamFragment::text(format!("[Configuration Error: {reason}]")))
                    .await;
                return CompletionOutcome::Failed(reason);
            }
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => CompletionOutcome::Cancelled,
                outcome = run_stream(factory, profile, request, &tx, &cancel) => outcome,
            };
            if let CompletionOutcome::Failed(message) = &outcome {
                if !cancel.is_cancelled() {
                    let _ = tx
                        .send(StreamFragment::text(format!("\n[System Error: {message}]")))
                        .await;
                }
            }
            outcome
        });
        CompletionStream {
            provider: resolved,
            fragments: ReceiverStream::new(rx),
            handle,
        }
    }

    /// Complete a generator request with the resolved provider's primary model.
    pub async fn complete(&self, request: GenerateRequest) -> Result<String, CoreError> {
        let resolved = self.resolve();
        let profile = self.profile(resolved.kind);
        if let Some(reason) = profile.unusable_reason() {
            return Err(CoreError::ProviderUnavailable(reason));
        }
        let model = profile
            .model
            .clone()
            .ok_or_else(|| CoreError::ProviderUnavailable(format!("no model configured for {}", profile.kind)))?;
        let backend = self.factory.create(&profile)?;
        debug!(
            "running completion (provider={}, model={}, structured={})",
            profile.kind,
            model,
            request.json_schema.is_some()
        );
        let text = backend
            .complete(BackendRequest {
                model,
                system: request.system,
                turns: request.turns,
                temperature: request.temperature,
                json_schema: request.json_schema,
                web_search: false,
                thinking_budget: None,
            })
            .await?;
        Ok(text)
    }

    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let stored = self.state.read().stored();
        if let Err(err) = store.save(&stored) {
            warn!("failed to persist router preferences (error={})", err);
        }
    }
}

async fn run_stream(
    factory: Arc<dyn BackendFactory>,
    profile: ProviderProfile,
    request: CompletionRequest,
    tx: &mpsc::Sender<StreamFragment>,
    cancel: &CancellationToken,
) -> CompletionOutcome {
    let kind = profile.kind;
    let backend_request = match backend_request(&profile, &request) {
        Ok(backend_request) => backend_request,
        Err(message) => return CompletionOutcome::Failed(message),
    };
    let result: Result<(), BackendError> = async {
        let backend = factory.create(&profile)?;
        let mut stream = backend.stream(backend_request).await?;
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            if cancel.is_cancelled() {
                return Ok(());
            }
            if fragment.is_empty() {
                continue;
            }
            if tx.send(fragment).await.is_err() {
                debug!("fragment receiver dropped (provider={})", kind);
                return Ok(());
            }
        }
        Ok(())
    }
    .await;
    match result {
        Ok(()) if cancel.is_cancelled() || tx.is_closed() => CompletionOutcome::Cancelled,
        Ok(()) => CompletionOutcome::Completed,
        Err(err) => {
            error!("completion stream failed (provider={}, error={})", kind, err);
            CompletionOutcome::Failed(err.to_string())
        }
    }
}

fn backend_request(profile: &ProviderProfile, request: &CompletionRequest) -> Result<BackendRequest, String> {
    let primary = if request.flags.concise() {
        profile.lite_model.clone().or_else(|| profile.model.clone())
    } else {
        profile.model.clone()
    };
    let model = primary.ok_or_else(|| format!("no model configured for {}", profile.kind))?;
    Ok(BackendRequest {
        model,
        system: Some(prompt::system_instruction(
            request.persona,
            request.twin.as_ref(),
            &request.flags,
            &request.files,
        )),
        turns: history_turns(&request.history),
        temperature: prompt::temperature(request.persona),
        json_schema: None,
        web_search: request.flags.web_search(),
        thinking_budget: prompt::thinking_budget(&request.flags),
    })
}

/// Convert transcript messages into provider turns.
///
/// Streaming placeholders and empty messages are skipped, the conversation
/// starts at the first user turn, and only the final user turn keeps its image.
pub(crate) fn history_turns(history: &[ChatMessage]) -> Vec<Turn> {
    let mut turns: Vec<Turn> = history
        .iter()
        .filter(|message| !message.is_streaming)
        .filter(|message| !message.text.trim().is_empty() || message.image.is_some())
        .skip_while(|message| message.role == ChatRole::Assistant)
        .map(|message| Turn {
            role: message.role,
            text: message.text.clone(),
            image: message.image.clone(),
        })
        .collect();
    let last_user = turns.iter().rposition(|turn| turn.role == ChatRole::User);
    for (index, turn) in turns.iter_mut().enumerate() {
        if Some(index) != last_user {
            turn.image = None;
        }
    }
    turns
}

#[cfg(test)]
mod tests {
    use super::history_turns;
    use crate::types::{ChatMessage, ChatRole, ImageAttachment};
    use pretty_assertions::assert_eq;
    use studyos_rs_protocol::AgentRole;

    #[test]
    fn history_drops_welcome_and_placeholder() {
        let mut answer = ChatMessage::placeholder(AgentRole::Teacher);
        answer.text = "Osmosis is diffusion of water.".to_string();
        answer.is_streaming = false;
        let history = vec![
            ChatMessage::welcome(),
            ChatMessage::user("first", Some(ImageAttachment::new("data:image/png;base64,AA"))),
            answer,
            ChatMessage::user("", Some(ImageAttachment::new("data:image/jpeg;base64,BB"))),
            ChatMessage::placeholder(AgentRole::Teacher),
        ];
        let turns = history_turns(&history);
        let roles: Vec<ChatRole> = turns.iter().map(|turn| turn.role).collect();
        assert_eq!(roles, vec![ChatRole::User, ChatRole::Assistant, ChatRole::User]);
        assert_eq!(turns[0].image, None);
        assert_eq!(
            turns[2].image,
            Some(ImageAttachment::new("data:image/jpeg;base64,BB"))
        );
    }
}
