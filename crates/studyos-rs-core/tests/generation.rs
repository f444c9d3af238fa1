use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use studyos_rs_config::StudyOsConfig;
use studyos_rs_core::generation::ContentGenerator;
use studyos_rs_core::router::ProviderRouter;
use studyos_rs_core::types::ChatMessage;
use studyos_rs_protocol::{
    FileDocument, FileKind, FileStatus, Grade, InsightKind, ProviderKind, QuestionKind,
};
use studyos_rs_test_utils::{ScriptedBackend, ScriptedFactory};

fn generator(backend: ScriptedBackend) -> ContentGenerator {
    let router = ProviderRouter::from_config_with_env(
        &StudyOsConfig::default(),
        Arc::new(ScriptedFactory::new(backend)),
        |name| (name == "GEMINI_API_KEY").then(|| "key".to_string()),
    );
    ContentGenerator::new(Arc::new(router))
}

fn document(name: &str, content: &str, status: FileStatus) -> FileDocument {
    FileDocument {
        id: name.to_string(),
        name: name.to_string(),
        kind: FileKind::Txt,
        content: content.to_string(),
        upload_date: 0,
        status,
        error_message: None,
    }
}

#[tokio::test]
async fn exam_paper_reads_fenced_output_and_sends_context() {
    let output = format!(
        "```json\n{}\n```",
        json!([{
            "id": "q1",
            "type": "OPEN",
            "text": "Define diffusion.",
            "markScheme": ["net movement", "concentration gradient"],
            "explanation": "High to low concentration.",
            "sourceCitation": "notes.txt",
            "difficulty": "hard",
            "marks": 3
        }])
    );
    let backend = ScriptedBackend::new(ProviderKind::Gemini).completion(output);
    let generator = generator(backend.clone());
    let files = vec![
        document("notes.txt", "Diffusion is passive.", FileStatus::Ready),
        document("draft.txt", "still parsing", FileStatus::Processing),
    ];

    let questions = generator.exam_paper("Transport", &files).await;
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].kind, QuestionKind::Open);
    assert_eq!(questions[0].effective_marks(), 3);

    let request = &backend.requests()[0];
    assert!(request.json_schema.is_some());
    let context = &request.turns[0].text;
    assert!(context.starts_with("CONTEXT:\n"));
    assert!(context.contains("notes.txt"));
    assert!(!context.contains("draft.txt"));
    assert!(request.turns[1].text.contains("\"Transport\""));
}

#[tokio::test]
async fn grade_falls_back_when_output_is_not_json() {
    let backend = ScriptedBackend::new(ProviderKind::Gemini).completion("Nice try, 3 out of 5.");
    let grade = generator(backend)
        .grade("Explain osmosis.", "water moves", &["water".to_string()])
        .await;
    assert_eq!(grade, Grade::failed());
}

#[tokio::test]
async fn grade_reads_camel_case_fields() {
    let backend = ScriptedBackend::new(ProviderKind::Gemini)
        .completion(json!({"score": 4, "maxScore": 5, "feedback": "Mention the membrane."}).to_string());
    let generator = generator(backend.clone());
    let grade = generator
        .grade("Explain osmosis.", "water moves", &["water".to_string(), "membrane".to_string()])
        .await;
    assert_eq!(grade.score, 4);
    assert_eq!(grade.max_score, 5);
    assert!(backend.requests()[0].turns[0].text.contains("water, membrane"));
}

#[tokio::test]
async fn provider_failure_degrades_to_empty_lists() {
    let generator = generator(ScriptedBackend::new(ProviderKind::Gemini).fail_on_start("quota"));
    assert!(generator.cognitive_exercises().await.is_empty());
    assert!(
        generator
            .exam_paper("Anything", &[])
            .await
            .is_empty()
    );
}

#[tokio::test]
async fn knowledge_graph_forces_default_mastery() {
    let backend = ScriptedBackend::new(ProviderKind::Gemini).completion(
        json!({"items": [
            {"id": "cell", "label": "Cell", "category": "Biology", "connections": ["atp"], "mastery": 90},
            {"id": "atp", "label": "ATP", "category": "Biology", "connections": []}
        ]})
        .to_string(),
    );
    let generator = generator(backend.clone());
    assert!(generator.knowledge_graph(&[]).await.is_empty());
    assert!(backend.requests().is_empty());

    let nodes = generator
        .knowledge_graph(&[document("bio.txt", "Cells make ATP.", FileStatus::Ready)])
        .await;
    let mastery: Vec<u8> = nodes.iter().map(|node| node.mastery).collect();
    assert_eq!(mastery, vec![50, 50]);
}

#[tokio::test]
async fn meta_analysis_only_reads_user_questions() {
    let backend = ScriptedBackend::new(ProviderKind::Gemini).completion(
        json!({"items": [
            {"type": "BIAS_DETECTED", "title": "Shallow questions", "description": "Mostly recall."},
            {"type": "STRENGTH", "title": "Curious", "description": "Asks why.", "timestamp": 42.0}
        ]})
        .to_string(),
    );
    let generator = generator(backend.clone());
    let history = vec![
        ChatMessage::welcome(),
        ChatMessage::user("what is ATP?", None),
        ChatMessage::user("why does it matter?", None),
    ];

    let insights = generator.meta_analysis(&history).await;
    assert_eq!(insights[0].kind, InsightKind::BiasDetected);
    assert!(insights[0].timestamp > 0.0);
    assert_eq!(insights[1].timestamp, 42.0);

    let prompt = &backend.requests()[0].turns[0].text;
    assert!(prompt.starts_with("what is ATP?\nwhy does it matter?"));
    assert!(!prompt.contains(&history[0].text));
}
