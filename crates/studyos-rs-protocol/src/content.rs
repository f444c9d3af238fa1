//! Study content exchanged with generators: personas, files, questions, and insights.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tutor persona that shapes the system instruction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentRole {
    Teacher,
    Examiner,
    Coach,
    Analyst,
    /// Orchestrating persona used when nothing else is selected.
    #[default]
    Council,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Teacher => "TEACHER",
            AgentRole::Examiner => "EXAMINER",
            AgentRole::Coach => "COACH",
            AgentRole::Analyst => "ANALYST",
            AgentRole::Council => "COUNCIL",
        }
    }

    /// Human-facing label.
    pub fn label(&self) -> &'static str {
        match self {
            AgentRole::Teacher => "Teacher",
            AgentRole::Examiner => "Examiner",
            AgentRole::Coach => "Coach",
            AgentRole::Analyst => "Analyst",
            AgentRole::Council => "The Council (Auto)",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "TEACHER" => Ok(AgentRole::Teacher),
            "EXAMINER" => Ok(AgentRole::Examiner),
            "COACH" => Ok(AgentRole::Coach),
            "ANALYST" => Ok(AgentRole::Analyst),
            "COUNCIL" => Ok(AgentRole::Council),
            other => Err(format!("unknown persona: {other}")),
        }
    }
}

/// Learner profile used to adapt tutor responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DigitalTwin {
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub recent_mood: String,
    #[serde(default)]
    pub exam_skills: ExamSkills,
}

/// Exam technique scores on a 0-100 scale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExamSkills {
    #[serde(default)]
    pub precision: u8,
    #[serde(default)]
    pub time_management: u8,
}

/// Source document kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Docx,
    Txt,
    Web,
}

/// Processing state of an uploaded document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Processing,
    Ready,
    Error,
}

/// Uploaded source material used as grounding context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileDocument {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub content: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub upload_date: i64,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl FileDocument {
    /// Whether the document can be used as grounding context.
    pub fn is_ready(&self) -> bool {
        self.status == FileStatus::Ready
    }
}

/// Question format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QuestionKind {
    #[serde(rename = "MCQ")]
    MultipleChoice,
    #[serde(rename = "OPEN")]
    Open,
}

/// Question difficulty band.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// A single exam or game question as produced by the generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_option_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mark_scheme: Option<Vec<String>>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub source_citation: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marks: Option<u32>,
}

impl Question {
    /// Marks awarded for this question; unspecified counts as one.
    pub fn effective_marks(&self) -> u32 {
        self.marks.unwrap_or(1)
    }
}

/// Timed exam paper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExamPaper {
    pub id: String,
    pub title: String,
    pub duration_minutes: u32,
    pub total_marks: u32,
    pub questions: Vec<Question>,
}

impl ExamPaper {
    /// Assemble a paper, summing per-question marks.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        duration_minutes: u32,
        questions: Vec<Question>,
    ) -> Self {
        let total_marks = questions.iter().map(Question::effective_marks).sum();
        Self {
            id: id.into(),
            title: title.into(),
            duration_minutes,
            total_marks,
            questions,
        }
    }
}

/// Result of grading one open answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub score: u32,
    pub max_score: u32,
    pub feedback: String,
}

impl Grade {
    /// Placeholder used when the grader cannot produce a result.
    pub fn failed() -> Self {
        Self {
            score: 0,
            max_score: 5,
            feedback: "Error grading".to_string(),
        }
    }
}

/// Game modes that shape question generation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameMode {
    McqArena,
    ExplainToWin,
    BossBattle,
}

/// Concept node extracted from source material.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeNode {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub connections: Vec<String>,
    #[serde(default = "default_mastery")]
    pub mastery: u8,
}

fn default_mastery() -> u8 {
    50
}

/// Kind of meta-cognitive insight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsightKind {
    BiasDetected,
    StrategySuggestion,
    Strength,
}

/// Observation about a learner's questioning patterns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetaInsight {
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub timestamp: f64,
}

/// Reasoning skill trained by an exercise.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CognitiveSkill {
    Logic,
    FirstPrinciples,
    Argumentation,
    LateralThinking,
}

/// Exercise difficulty tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExerciseDifficulty {
    Novice,
    Adept,
    Master,
}

/// Subject-independent reasoning exercise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CognitiveExercise {
    pub id: String,
    pub title: String,
    pub skill: CognitiveSkill,
    pub description: String,
    pub difficulty: ExerciseDifficulty,
}
