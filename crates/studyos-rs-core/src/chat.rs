//! Chat transcript owner that drives one cancelable streaming reply at a time.

use crate::error::CoreError;
use crate::router::{CompletionOutcome, CompletionRequest, ProviderRouter};
use crate::state::TranscriptStore;
use crate::types::{ChatMessage, ImageAttachment};
use crate::uploads::FileLibrary;
use chrono::Utc;
use futures_util::StreamExt;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use studyos_rs_protocol::{
    AgentRole, DigitalTwin, EventMsg, EventPayload, EventSink, FeatureFlags, MessageId, SessionId,
    StreamFragment, merge_grounding,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Marker appended to a reply the user stopped.
pub const STOPPED_MARKER: &str = "\n[stopped]";

/// Why a send was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No text and no image.
    Blank,
    /// A reply is already streaming.
    Busy,
}

/// Handle to a started reply.
#[derive(Debug)]
pub struct SendHandle {
    pub user_message_id: MessageId,
    pub reply_id: MessageId,
    handle: JoinHandle<CompletionOutcome>,
}

impl SendHandle {
    /// Wait until the reply stops streaming.
    pub async fn finish(self) -> CompletionOutcome {
        self.handle
            .await
            .unwrap_or_else(|err| CompletionOutcome::Failed(err.to_string()))
    }
}

#[derive(Debug)]
pub enum SendOutcome {
    Rejected(RejectReason),
    Started(SendHandle),
}

struct InFlight {
    reply_id: MessageId,
    cancel: CancellationToken,
}

#[derive(Clone, Default)]
struct TurnSettings {
    persona: AgentRole,
    twin: Option<DigitalTwin>,
    flags: FeatureFlags,
}

struct Shared {
    transcript_id: SessionId,
    messages: Mutex<Vec<ChatMessage>>,
    in_flight: Mutex<Option<InFlight>>,
    sink: Option<Arc<dyn EventSink>>,
    store: Option<Arc<dyn TranscriptStore>>,
}

impl Shared {
    fn emit(&self, payload: EventPayload) {
        if let Some(sink) = &self.sink {
            sink.emit(EventMsg::new(self.transcript_id, payload));
        }
    }

    fn persist(&self, message: &ChatMessage) {
        if let Some(store) = &self.store {
            if let Err(err) = store.append_message(self.transcript_id, message) {
                warn!(
                    "failed to persist chat message (transcript_id={}, error={})",
                    self.transcript_id, err
                );
            }
        }
    }

    fn append(&self, message: ChatMessage) {
        let (id, role) = (message.id, message.role);
        if !message.is_streaming {
            self.persist(&message);
        }
        self.messages.lock().push(message);
        self.emit(EventPayload::MessageAppended {
            message_id: id,
            role: role.as_str().to_string(),
        });
    }

    /// Apply a fragment while the reply is still streaming; later fragments are dropped.
    fn apply(&self, reply_id: MessageId, fragment: StreamFragment) {
        let added = {
            let mut messages = self.messages.lock();
            let Some(reply) = messages
                .iter_mut()
                .find(|message| message.id == reply_id && message.is_streaming)
            else {
                return;
            };
            reply.text.push_str(&fragment.text);
            merge_grounding(&mut reply.grounding, &fragment.grounding) > 0
        };
        if !fragment.text.is_empty() {
            self.emit(EventPayload::MessageDelta {
                message_id: reply_id,
                delta: fragment.text,
            });
        }
        if added {
            let grounding = self
                .messages
                .lock()
                .iter()
                .find(|message| message.id == reply_id)
                .map(|message| message.grounding.clone())
                .unwrap_or_default();
            self.emit(EventPayload::GroundingUpdated {
                message_id: reply_id,
                grounding,
            });
        }
    }

    /// Clear the streaming flag. Only the first call for a reply has any effect.
    fn complete(&self, reply_id: MessageId, stopped: bool) -> bool {
        let finished = {
            let mut messages = self.messages.lock();
            let Some(reply) = messages
                .iter_mut()
                .find(|message| message.id == reply_id && message.is_streaming)
            else {
                return false;
            };
            reply.is_streaming = false;
            if stopped {
                reply.text.push_str(STOPPED_MARKER);
            }
            reply.clone()
        };
        self.persist(&finished);
        self.emit(EventPayload::MessageCompleted {
            message_id: reply_id,
            stopped,
        });
        true
    }

    fn release(&self, reply_id: MessageId) {
        let mut in_flight = self.in_flight.lock();
        if in_flight
            .as_ref()
            .is_some_and(|current| current.reply_id == reply_id)
        {
            *in_flight = None;
        }
    }
}

/// Builder for [`ChatStreamController`].
pub struct ChatControllerBuilder {
    router: Arc<ProviderRouter>,
    sink: Option<Arc<dyn EventSink>>,
    store: Option<Arc<dyn TranscriptStore>>,
    files: Option<Arc<FileLibrary>>,
    settings: TurnSettings,
    restore: Option<(SessionId, usize)>,
}

impl ChatControllerBuilder {
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn transcript_store(mut self, store: Arc<dyn TranscriptStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Library whose ready files ground every reply.
    pub fn files(mut self, files: Arc<FileLibrary>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn default_persona(mut self, persona: AgentRole) -> Self {
        self.settings.persona = persona;
        self
    }

    /// Resume an existing transcript, keeping its last `history_limit` messages.
    pub fn restore(mut self, transcript_id: SessionId, history_limit: usize) -> Self {
        self.restore = Some((transcript_id, history_limit));
        self
    }

    pub fn build(self) -> Result<ChatStreamController, CoreError> {
        let (transcript_id, messages) = match (self.restore, &self.store) {
            (Some((transcript_id, limit)), Some(store)) => {
                let record = store.load_transcript(transcript_id)?.ok_or_else(|| {
                    CoreError::Parse(format!("transcript not found: {transcript_id}"))
                })?;
                let skip = record.messages.len().saturating_sub(limit);
                let messages: Vec<ChatMessage> = record
                    .messages
                    .into_iter()
                    .skip(skip)
                    .map(|mut message| {
                        message.is_streaming = false;
                        message
                    })
                    .collect();
                info!(
                    "restored chat transcript (transcript_id={}, messages={})",
                    transcript_id,
                    messages.len()
                );
                (transcript_id, messages)
            }
            _ => {
                let transcript_id = Uuid::new_v4();
                let welcome = ChatMessage::welcome();
                if let Some(store) = &self.store {
                    store.create_transcript(transcript_id, Utc::now())?;
                    store.append_message(transcript_id, &welcome)?;
                }
                (transcript_id, vec![welcome])
            }
        };
        Ok(ChatStreamController {
            router: self.router,
            files: self.files,
            settings: RwLock::new(self.settings),
            shared: Arc::new(Shared {
                transcript_id,
                messages: Mutex::new(messages),
                in_flight: Mutex::new(None),
                sink: self.sink,
                store: self.store,
            }),
        })
    }
}

/// Owns the transcript and runs at most one streaming reply.
pub struct ChatStreamController {
    router: Arc<ProviderRouter>,
    files: Option<Arc<FileLibrary>>,
    settings: RwLock<TurnSettings>,
    shared: Arc<Shared>,
}

impl ChatStreamController {
    pub fn builder(router: Arc<ProviderRouter>) -> ChatControllerBuilder {
        ChatControllerBuilder {
            router,
            sink: None,
            store: None,
            files: None,
            settings: TurnSettings::default(),
            restore: None,
        }
    }

    /// Controller with a fresh in-memory transcript.
    pub fn new(router: Arc<ProviderRouter>) -> Self {
        Self {
            router,
            files: None,
            settings: RwLock::new(TurnSettings::default()),
            shared: Arc::new(Shared {
                transcript_id: Uuid::new_v4(),
                messages: Mutex::new(vec![ChatMessage::welcome()]),
                in_flight: Mutex::new(None),
                sink: None,
                store: None,
            }),
        }
    }

    pub fn transcript_id(&self) -> SessionId {
        self.shared.transcript_id
    }

    /// Snapshot of the transcript.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.shared.messages.lock().clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.in_flight.lock().is_some()
    }

    pub fn set_persona(&self, persona: AgentRole) {
        self.settings.write().persona = persona;
    }

    pub fn persona(&self) -> AgentRole {
        self.settings.read().persona
    }

    pub fn set_flags(&self, flags: FeatureFlags) {
        self.settings.write().flags = flags.normalized();
    }

    pub fn flags(&self) -> FeatureFlags {
        self.settings.read().flags
    }

    pub fn set_twin(&self, twin: Option<DigitalTwin>) {
        self.settings.write().twin = twin;
    }

    /// Append a user message and start streaming the reply.
    pub fn send(
        &self,
        text: impl Into<String>,
        image: Option<ImageAttachment>,
        persona: Option<AgentRole>,
    ) -> SendOutcome {
        let text = text.into();
        if text.trim().is_empty() && image.is_none() {
            return SendOutcome::Rejected(RejectReason::Blank);
        }
        let settings = self.settings.read().clone();
        let persona = persona.unwrap_or(settings.persona);
        let reply = ChatMessage::placeholder(persona);
        let reply_id = reply.id;
        let cancel = CancellationToken::new();
        {
            let mut in_flight = self.shared.in_flight.lock();
            if in_flight.is_some() {
                debug!(
                    "ignoring send while a reply is streaming (transcript_id={})",
                    self.shared.transcript_id
                );
                return SendOutcome::Rejected(RejectReason::Busy);
            }
            *in_flight = Some(InFlight {
                reply_id,
                cancel: cancel.clone(),
            });
        }

        let user = ChatMessage::user(text, image);
        let user_message_id = user.id;
        self.shared.append(user);
        let history = self.messages();
        self.shared.append(reply);

        let files = self
            .files
            .as_ref()
            .map(|library| library.ready())
            .unwrap_or_default();
        let mut stream = self.router.stream_completion(
            CompletionRequest {
                history,
                persona,
                twin: settings.twin,
                files,
                flags: settings.flags,
            },
            cancel,
        );
        debug!(
            "started reply (transcript_id={}, reply_id={}, provider={})",
            self.shared.transcript_id, reply_id, stream.provider.kind
        );
        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            while let Some(fragment) = stream.next().await {
                shared.apply(reply_id, fragment);
            }
            let outcome = stream.finish().await;
            shared.complete(reply_id, false);
            shared.release(reply_id);
            outcome
        });
        SendOutcome::Started(SendHandle {
            user_message_id,
            reply_id,
            handle,
        })
    }

    /// Cancel the in-flight reply and mark it stopped. Returns false when idle.
    pub fn stop(&self) -> bool {
        let Some(in_flight) = self.shared.in_flight.lock().take() else {
            return false;
        };
        in_flight.cancel.cancel();
        self.shared.complete(in_flight.reply_id, true);
        info!(
            "stopped reply (transcript_id={}, reply_id={})",
            self.shared.transcript_id, in_flight.reply_id
        );
        true
    }
}
