//! Structured content generators: exam papers, game questions, grading, and insights.
//!
//! Every generator goes through [`ProviderRouter::complete`] with a JSON schema
//! and degrades to an empty result when the provider or the output fails.

use crate::error::CoreError;
use crate::exam::PaperSource;
use crate::prompt::files_context;
use crate::router::{GenerateRequest, ProviderRouter};
use crate::types::{ChatMessage, ChatRole};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use studyos_rs_protocol::{
    CognitiveExercise, FileDocument, GameMode, Grade, KnowledgeNode, MetaInsight, Question,
};

/// Files fed to the knowledge graph generator.
const GRAPH_FILE_LIMIT: usize = 3;
/// Characters kept from each graph file.
const GRAPH_CHARS_PER_FILE: usize = 2000;
const GRAPH_MASTERY: u8 = 50;

fn list_schema(item: Value) -> Value {
    json!({
        "type": "object",
        "properties": { "items": { "type": "array", "items": item } },
        "required": ["items"]
    })
}

fn question_schema() -> Value {
    list_schema(json!({
        "type": "object",
        "properties": {
            "id": { "type": "string" },
            "type": { "type": "string", "enum": ["MCQ", "OPEN"] },
            "text": { "type": "string" },
            "options": { "type": "array", "items": { "type": "string" } },
            "correctOptionIndex": { "type": "integer" },
            "markScheme": { "type": "array", "items": { "type": "string" } },
            "explanation": { "type": "string" },
            "sourceCitation": { "type": "string" },
            "difficulty": { "type": "string", "enum": ["easy", "medium", "hard"] },
            "marks": { "type": "integer" }
        },
        "required": ["id", "type", "text", "explanation", "sourceCitation", "difficulty", "marks"]
    }))
}

fn grade_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "score": { "type": "integer" },
            "maxScore": { "type": "integer" },
            "feedback": { "type": "string" }
        },
        "required": ["score", "maxScore", "feedback"]
    })
}

fn graph_schema() -> Value {
    list_schema(json!({
        "type": "object",
        "properties": {
            "id": { "type": "string" },
            "label": { "type": "string" },
            "category": { "type": "string" },
            "connections": { "type": "array", "items": { "type": "string" } },
            "mastery": { "type": "integer" }
        },
        "required": ["id", "label", "category", "connections"]
    }))
}

fn insight_schema() -> Value {
    list_schema(json!({
        "type": "object",
        "properties": {
            "type": { "type": "string", "enum": ["BIAS_DETECTED", "STRATEGY_SUGGESTION", "STRENGTH"] },
            "title": { "type": "string" },
            "description": { "type": "string" },
            "timestamp": { "type": "number" }
        },
        "required": ["type", "title", "description"]
    }))
}

fn exercise_schema() -> Value {
    list_schema(json!({
        "type": "object",
        "properties": {
            "id": { "type": "string" },
            "title": { "type": "string" },
            "skill": {
                "type": "string",
                "enum": ["LOGIC", "FIRST_PRINCIPLES", "ARGUMENTATION", "LATERAL_THINKING"]
            },
            "description": { "type": "string" },
            "difficulty": { "type": "string", "enum": ["Novice", "Adept", "Master"] }
        },
        "required": ["id", "title", "skill", "description", "difficulty"]
    }))
}

/// Strip a surrounding markdown code fence, if any.
fn unfence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_suffix("```").unwrap_or(body);
    match body.split_once('\n') {
        Some((lang, rest)) if !lang.trim().contains(' ') => rest.trim(),
        _ => body.trim(),
    }
}

/// Decode a generated list, accepting either a bare array or `{"items": [...]}`.
pub fn parse_list<T: DeserializeOwned>(text: &str) -> Result<Vec<T>, CoreError> {
    let body = unfence(text);
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let value: Value =
        serde_json::from_str(body).map_err(|err| CoreError::Parse(err.to_string()))?;
    let items = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => map.remove("items").unwrap_or(Value::Array(Vec::new())),
        other => {
            return Err(CoreError::Parse(format!("expected a list, got {other}")));
        }
    };
    serde_json::from_value(items).map_err(|err| CoreError::Parse(err.to_string()))
}

fn parse_grade(text: &str) -> Result<Grade, CoreError> {
    serde_json::from_str(unfence(text)).map_err(|err| CoreError::Parse(err.to_string()))
}

fn degrade<T>(what: &str, result: Result<Vec<T>, CoreError>) -> Vec<T> {
    result.unwrap_or_else(|err| {
        warn!("content generation failed (kind={}, error={})", what, err);
        Vec::new()
    })
}

/// Instruction for one game mode.
pub fn game_instruction(mode: GameMode, topic: &str, count: usize) -> String {
    match mode {
        GameMode::McqArena => format!(
            "Generate {count} Multiple Choice Questions (MCQ) on \"{topic}\". Ensure they are challenging but fair."
        ),
        GameMode::ExplainToWin => format!(
            "Generate {count} Open Ended questions on \"{topic}\". The questions should ask the user to explain a concept in detail."
        ),
        GameMode::BossBattle => format!(
            "Generate {count} very difficult questions on \"{topic}\". Mix of MCQ and Open Ended. These should test deep understanding."
        ),
    }
}

/// Graph context: the first ready files, each truncated.
pub fn graph_context(files: &[FileDocument]) -> String {
    files
        .iter()
        .filter(|file| file.is_ready())
        .take(GRAPH_FILE_LIMIT)
        .map(|file| {
            let excerpt: String = file.content.chars().take(GRAPH_CHARS_PER_FILE).collect();
            format!("--- FILE: {} ---\n{}", file.name, excerpt)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Generates study content through the router's resolved provider.
#[derive(Clone)]
pub struct ContentGenerator {
    router: Arc<ProviderRouter>,
}

impl ContentGenerator {
    pub fn new(router: Arc<ProviderRouter>) -> Self {
        Self { router }
    }

    async fn questions(&self, prompt: String, files: &[FileDocument]) -> Result<Vec<Question>, CoreError> {
        let request = GenerateRequest::new(prompt)
            .with_context(format!("CONTEXT:\n{}", files_context(files)))
            .with_schema(question_schema());
        let text = self.router.complete(request).await?;
        parse_list(&text)
    }

    async fn try_exam_paper(&self, topic: &str, files: &[FileDocument]) -> Result<Vec<Question>, CoreError> {
        let prompt = format!(
            "Generate a strict 5-question exam paper on \"{topic}\" based on the sources.
Include a mix of MCQ (2) and Open Ended (3) questions.
Assign marks (e.g., [1 mark], [4 marks]).
Return JSON."
        );
        let questions = self.questions(prompt, files).await?;
        debug!(
            "generated exam paper (topic={}, questions={})",
            topic,
            questions.len()
        );
        Ok(questions)
    }

    /// Five-question exam paper; empty on failure.
    pub async fn exam_paper(&self, topic: &str, files: &[FileDocument]) -> Vec<Question> {
        degrade("exam_paper", self.try_exam_paper(topic, files).await)
    }

    /// Questions for a game mode; empty on failure.
    pub async fn game_questions(
        &self,
        topic: &str,
        mode: GameMode,
        files: &[FileDocument],
        count: usize,
    ) -> Vec<Question> {
        let prompt = format!(
            "{}\nBased on the provided sources.\nAssign marks (e.g., [1 mark], [4 marks]).\nReturn JSON.",
            game_instruction(mode, topic, count)
        );
        degrade("game_questions", self.questions(prompt, files).await)
    }

    /// Grade an open answer against its mark scheme.
    ///
    /// Any failure yields [`Grade::failed`].
    pub async fn grade(&self, question: &str, answer: &str, mark_scheme: &[String]) -> Grade {
        let prompt = format!(
            "You are a strict Examiner. Grade this student response.

Question: {question}
Student Answer: {answer}
Mark Scheme / Key Points: {}

Task:
1. Award marks based on keywords present.
2. Provide constructive feedback on what was missed.
3. Be encouraging but strict on terminology.",
            mark_scheme.join(", ")
        );
        let request = GenerateRequest::new(prompt).with_schema(grade_schema());
        match self.router.complete(request).await {
            Ok(text) => parse_grade(&text).unwrap_or_else(|err| {
                warn!("grade output unreadable (error={})", err);
                Grade::failed()
            }),
            Err(err) => {
                warn!("grading failed (error={})", err);
                Grade::failed()
            }
        }
    }

    /// Concept graph over the first ready files.
    pub async fn knowledge_graph(&self, files: &[FileDocument]) -> Vec<KnowledgeNode> {
        let context = graph_context(files);
        if context.is_empty() {
            return Vec::new();
        }
        let request = GenerateRequest::new(
            "Analyze the provided content. Extract 10-15 key concepts (nodes) and their interconnections.
Return JSON with id, label, category and connections (ids of related nodes).
Assign mastery strictly as 50 (default).",
        )
        .with_context(context)
        .with_schema(graph_schema());
        let result = async {
            let text = self.router.complete(request).await?;
            parse_list::<KnowledgeNode>(&text)
        }
        .await;
        degrade("knowledge_graph", result)
            .into_iter()
            .map(|mut node| {
                node.mastery = GRAPH_MASTERY;
                node
            })
            .collect()
    }

    /// Meta-cognitive insights over the user's questions.
    pub async fn meta_analysis(&self, history: &[ChatMessage]) -> Vec<MetaInsight> {
        let questions = history
            .iter()
            .filter(|message| message.role == ChatRole::User && !message.text.trim().is_empty())
            .map(|message| message.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if questions.is_empty() {
            return Vec::new();
        }
        let prompt = format!(
            "{questions}
Analyze this student's query history. Detect meta-cognitive patterns:
1. Are they asking shallow or deep questions?
2. Do they show \"Illusion of Competence\"?
3. What learning strategy would help them?

Return 3 insights in JSON."
        );
        let request = GenerateRequest::new(prompt).with_schema(insight_schema());
        let result = async {
            let text = self.router.complete(request).await?;
            parse_list::<MetaInsight>(&text)
        }
        .await;
        let now = Utc::now().timestamp_millis() as f64;
        degrade("meta_analysis", result)
            .into_iter()
            .map(|mut insight| {
                if insight.timestamp <= 0.0 {
                    insight.timestamp = now;
                }
                insight
            })
            .collect()
    }

    /// Subject-independent reasoning exercises.
    pub async fn cognitive_exercises(&self) -> Vec<CognitiveExercise> {
        let request = GenerateRequest::new(
            "Generate 3 abstract cognitive exercises to train reasoning skills (not subject specific).
Topics: Logical Fallacies, First Principles, Analogical Reasoning.
Return JSON.",
        )
        .with_schema(exercise_schema());
        let result = async {
            let text = self.router.complete(request).await?;
            parse_list::<CognitiveExercise>(&text)
        }
        .await;
        degrade("cognitive_exercises", result)
    }
}

#[async_trait]
impl PaperSource for ContentGenerator {
    async fn generate_paper(&self, topic: &str, files: &[FileDocument]) -> Result<Vec<Question>, CoreError> {
        self.try_exam_paper(topic, files).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use studyos_rs_protocol::{FileKind, FileStatus, InsightKind};

    fn file(name: &str, content: String, status: FileStatus) -> FileDocument {
        FileDocument {
            id: name.to_string(),
            name: name.to_string(),
            kind: FileKind::Txt,
            content,
            upload_date: 0,
            status,
            error_message: None,
        }
    }

    #[test]
    fn parses_wrapped_and_bare_lists() {
        let wrapped: Vec<MetaInsight> = parse_list(
            r#"{"items":[{"type":"STRENGTH","title":"Curious","description":"Deep questions"}]}"#,
        )
        .expect("wrapped");
        assert_eq!(wrapped[0].kind, InsightKind::Strength);

        let fenced: Vec<KnowledgeNode> =
            parse_list("```json\n[{\"id\":\"1\",\"label\":\"Osmosis\"}]\n```").expect("fenced");
        assert_eq!(fenced[0].label, "Osmosis");
        assert_eq!(fenced[0].mastery, 50);

        assert!(parse_list::<KnowledgeNode>("").expect("empty").is_empty());
        assert!(parse_list::<KnowledgeNode>("not json").is_err());
    }

    #[test]
    fn graph_context_limits_files_and_length() {
        let files: Vec<FileDocument> = (0..5)
            .map(|index| file(&format!("f{index}.txt"), "x".repeat(2500), FileStatus::Ready))
            .chain(std::iter::once(file("late.txt", "y".to_string(), FileStatus::Processing)))
            .collect();
        let context = graph_context(&files);
        assert_eq!(context.matches("--- FILE: ").count(), 3);
        assert!(context.starts_with("--- FILE: f0.txt ---\n"));
        assert!(!context.contains("x".repeat(2001).as_str()));
    }

    #[test]
    fn game_instruction_mentions_count_and_topic() {
        let text = game_instruction(GameMode::ExplainToWin, "Physics", 4);
        assert!(text.starts_with("Generate 4 Open Ended questions on \"Physics\"."));
        assert!(game_instruction(GameMode::BossBattle, "Maths", 2).contains("very difficult"));
    }

    #[test]
    fn grade_parses_camel_case() {
        let grade = parse_grade(r#"{"score":3,"maxScore":5,"feedback":"Missing osmosis"}"#).expect("grade");
        assert_eq!(grade.max_score, 5);
    }
}
