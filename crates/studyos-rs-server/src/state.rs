//! Shared application state handed to every route.

use crate::error::ServerError;
use log::{debug, info};
use std::sync::Arc;
use studyos_rs_config::StudyOsConfig;
use studyos_rs_core::state::TranscriptStore;
use studyos_rs_core::{
    ChatStreamController, ClientReportedMonitor, ContentGenerator, CoreError, FileLibrary,
    ProctoredSessionMachine, ProviderRouter,
};
use studyos_rs_protocol::{EventMsg, EventSink};
use tokio::sync::broadcast;

const EVENT_BUFFER: usize = 256;

/// Fans chat and exam events out to `/api/events` subscribers.
#[derive(Debug, Clone)]
pub struct EventHub {
    sender: broadcast::Sender<EventMsg>,
}

impl EventHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventMsg> {
        self.sender.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventHub {
    fn emit(&self, event: EventMsg) {
        // No subscribers is the common case.
        if self.sender.send(event).is_err() {
            debug!("dropped event without subscribers");
        }
    }
}

pub struct AppState {
    pub config: StudyOsConfig,
    pub router: Arc<ProviderRouter>,
    pub files: Arc<FileLibrary>,
    pub chat: ChatStreamController,
    pub generator: Arc<ContentGenerator>,
    pub exam: ProctoredSessionMachine,
    /// Receives environment signals reported by the browser.
    pub monitor: Arc<ClientReportedMonitor>,
    pub events: EventHub,
}

impl AppState {
    /// Wire the chat controller and exam machine around one router.
    pub fn new(
        config: StudyOsConfig,
        router: Arc<ProviderRouter>,
        transcripts: Option<Arc<dyn TranscriptStore>>,
    ) -> Result<Self, ServerError> {
        let events = EventHub::new();
        let files = Arc::new(FileLibrary::new());
        let mut chat = ChatStreamController::builder(router.clone())
            .event_sink(Arc::new(events.clone()))
            .files(files.clone())
            .default_persona(config.chat.default_persona);
        if let Some(store) = transcripts {
            if let Some(latest) = store.latest_transcript().map_err(CoreError::from)? {
                debug!("resuming transcript (transcript_id={})", latest);
                chat = chat.restore(latest, config.chat.history_limit);
            }
            chat = chat.transcript_store(store);
        }
        let chat = chat.build()?;
        let generator = Arc::new(ContentGenerator::new(router.clone()));
        let monitor = Arc::new(ClientReportedMonitor::new());
        let exam = ProctoredSessionMachine::builder(config.exam.clone(), monitor.clone(), generator.clone())
            .event_sink(Arc::new(events.clone()))
            .build()?;
        info!(
            "built app state (transcript_id={}, exam_minutes={})",
            chat.transcript_id(),
            config.exam.duration_minutes
        );
        Ok(Self {
            config,
            router,
            files,
            chat,
            generator,
            exam,
            monitor,
            events,
        })
    }
}
