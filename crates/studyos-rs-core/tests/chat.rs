use pretty_assertions::assert_eq;
use std::sync::Arc;
use studyos_rs_config::StudyOsConfig;
use studyos_rs_core::chat::{ChatStreamController, RejectReason, STOPPED_MARKER, SendHandle, SendOutcome};
use studyos_rs_core::router::{CompletionOutcome, ProviderRouter};
use studyos_rs_core::state::{JsonlTranscriptStore, TranscriptStore};
use studyos_rs_core::types::{ChatMessage, ChatRole, ImageAttachment};
use studyos_rs_protocol::{AgentRole, EventPayload, ProviderKind};
use studyos_rs_test_utils::{RecordingSink, ScriptedBackend, ScriptedFactory};

fn router(backend: ScriptedBackend) -> (Arc<ProviderRouter>, ScriptedFactory) {
    let factory = ScriptedFactory::new(backend);
    let router = ProviderRouter::from_config_with_env(
        &StudyOsConfig::default(),
        Arc::new(factory.clone()),
        |name| (name == "GEMINI_API_KEY").then(|| "key".to_string()),
    );
    (Arc::new(router), factory)
}

fn started(outcome: SendOutcome) -> SendHandle {
    match outcome {
        SendOutcome::Started(handle) => handle,
        SendOutcome::Rejected(reason) => panic!("send rejected: {reason:?}"),
    }
}

fn reply(controller: &ChatStreamController) -> ChatMessage {
    controller.messages().last().cloned().expect("reply")
}

async fn wait_for_text(controller: &ChatStreamController, text: &str) {
    for _ in 0..1_000 {
        if reply(controller).text.contains(text) {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("reply never contained {text:?}");
}

#[tokio::test]
async fn fragments_concatenate_into_the_placeholder() {
    let (router, factory) = router(ScriptedBackend::new(ProviderKind::Gemini).text("Hel").text("lo"));
    let controller = ChatStreamController::new(router);
    let handle = started(controller.send("say hello", None, Some(AgentRole::Coach)));

    // The user turn and placeholder are appended before any network work.
    let messages = controller.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].role, ChatRole::User);
    assert_eq!(messages[1].id, handle.user_message_id);
    assert_eq!(messages[2].id, handle.reply_id);

    assert_eq!(handle.finish().await, CompletionOutcome::Completed);
    let answer = reply(&controller);
    assert_eq!(answer.text, "Hello");
    assert!(!answer.is_streaming);
    assert_eq!(answer.persona, Some(AgentRole::Coach));
    assert!(!controller.is_streaming());

    let sent = &factory.backend().requests()[0];
    assert_eq!(sent.turns.last().map(|turn| turn.text.as_str()), Some("say hello"));
    assert!(sent.system.as_deref().is_some_and(|system| system.contains("Performance Coach")));
}

#[tokio::test]
async fn blank_and_concurrent_sends_are_rejected() {
    let (router, _factory) = router(ScriptedBackend::new(ProviderKind::Gemini).text("thinking").stall());
    let controller = ChatStreamController::new(router);

    assert!(matches!(
        controller.send("   ", None, None),
        SendOutcome::Rejected(RejectReason::Blank)
    ));
    assert_eq!(controller.messages().len(), 1);

    let handle = started(controller.send("first", None, None));
    assert!(matches!(
        controller.send("second", None, None),
        SendOutcome::Rejected(RejectReason::Busy)
    ));
    assert_eq!(controller.messages().len(), 3);

    assert!(controller.stop());
    assert_eq!(handle.finish().await, CompletionOutcome::Cancelled);
}

#[tokio::test]
async fn image_without_text_is_accepted() {
    let (router, factory) = router(ScriptedBackend::new(ProviderKind::Gemini).text("A cell."));
    let controller = ChatStreamController::new(router);
    let image = ImageAttachment::new("data:image/png;base64,AAAA");
    let handle = started(controller.send("", Some(image.clone()), None));
    handle.finish().await;
    let sent = &factory.backend().requests()[0];
    assert_eq!(sent.turns[0].image, Some(image));
}

#[tokio::test]
async fn stop_marks_reply_and_drops_later_fragments() {
    let (router, _factory) = router(ScriptedBackend::new(ProviderKind::Gemini).text("partial").stall());
    let sink = Arc::new(RecordingSink::new());
    let controller = ChatStreamController::builder(router)
        .event_sink(sink.clone())
        .build()
        .expect("controller");
    let handle = started(controller.send("explain", None, None));
    wait_for_text(&controller, "partial").await;

    assert!(controller.stop());
    let stopped = reply(&controller);
    assert_eq!(stopped.text, format!("partial{STOPPED_MARKER}"));
    assert!(!stopped.is_streaming);
    assert!(!controller.is_streaming());

    assert_eq!(handle.finish().await, CompletionOutcome::Cancelled);
    assert_eq!(reply(&controller).text, "partial\n[stopped]");
    assert!(!controller.stop());

    let completions: Vec<bool> = sink
        .payloads()
        .into_iter()
        .filter_map(|payload| match payload {
            EventPayload::MessageCompleted { stopped, .. } => Some(stopped),
            _ => None,
        })
        .collect();
    assert_eq!(completions, vec![true]);
}

#[tokio::test]
async fn grounding_is_deduplicated_by_uri() {
    let backend = ScriptedBackend::new(ProviderKind::Gemini)
        .grounding("First title", "https://a.example")
        .text("Answer")
        .grounding("Second title", "https://a.example")
        .grounding("Other", "https://b.example");
    let (router, _factory) = router(backend);
    let controller = ChatStreamController::new(router);
    started(controller.send("cite", None, None)).finish().await;

    let answer = reply(&controller);
    let uris: Vec<&str> = answer.grounding.iter().map(|link| link.uri.as_str()).collect();
    assert_eq!(uris, vec!["https://a.example", "https://b.example"]);
    assert_eq!(answer.grounding[0].title, "First title");
}

#[tokio::test]
async fn provider_failure_lands_in_the_transcript() {
    let (router, _factory) = router(ScriptedBackend::new(ProviderKind::Gemini).fail("network down"));
    let controller = ChatStreamController::new(router);
    let outcome = started(controller.send("hi", None, None)).finish().await;

    assert!(matches!(outcome, CompletionOutcome::Failed(_)));
    let answer = reply(&controller);
    assert!(answer.text.starts_with("\n[System Error: "));
    assert!(answer.text.contains("network down"));
    assert!(!answer.is_streaming);
    assert!(!controller.is_streaming());
}

#[tokio::test]
async fn finished_messages_persist_and_restore() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store: Arc<dyn TranscriptStore> =
        Arc::new(JsonlTranscriptStore::new(dir.path()).expect("store"));
    let (router, _factory) = router(ScriptedBackend::new(ProviderKind::Gemini).text("Water moves."));

    let controller = ChatStreamController::builder(router.clone())
        .transcript_store(store.clone())
        .build()
        .expect("controller");
    started(controller.send("osmosis?", None, None)).finish().await;
    let transcript_id = controller.transcript_id();

    let record = store
        .load_transcript(transcript_id)
        .expect("load")
        .expect("record");
    let texts: Vec<&str> = record.messages.iter().map(|message| message.text.as_str()).collect();
    assert_eq!(texts[1..].to_vec(), vec!["osmosis?", "Water moves."]);

    let restored = ChatStreamController::builder(router)
        .transcript_store(store)
        .restore(transcript_id, 2)
        .build()
        .expect("restored");
    assert_eq!(restored.transcript_id(), transcript_id);
    let messages = restored.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].text, "Water moves.");
    assert!(messages.iter().all(|message| !message.is_streaming));
}
