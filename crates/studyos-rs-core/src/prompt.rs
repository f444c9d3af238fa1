//! System instruction assembly for tutor requests.
//!
//! The instruction is built from five parts in a fixed order: the grounding
//! rules, the persona, the optional learner profile, the feature directives,
//! and the ready source files.

use studyos_rs_protocol::{AgentRole, DigitalTwin, FeatureFlags, FileDocument};

/// Grounding rules shared by every persona.
pub const BASE_INSTRUCTION: &str = "You are Study OS, an advanced, hallucination-proof AI tutor.
Your core directive is GROUNDING.

RULES:
1. Answer ONLY based on the provided \"User Files\" and \"Context\".
2. If the answer is not in the context, strictly state: \"I could not find information regarding this in your source materials.\"
3. When you make a claim, you MUST cite the source filename in brackets, e.g., \"Mitochondria are the powerhouse of the cell [Biology_Chapter_1.pdf]\".";

/// Context sentence used when no file is ready.
pub const NO_FILES_CONTEXT: &str =
    "No files uploaded yet. Rely on general knowledge (or Google Search if enabled).";

const DEEP_REASONING_DIRECTIVE: &str =
    "\n\nUse your thinking capabilities to reason deeply before answering.";
const CONCISE_DIRECTIVE: &str = "\n\nProvide a concise and immediate response.";

/// Token budget granted to reasoning when deep reasoning is enabled.
pub const THINKING_BUDGET: u32 = 2048;

/// Persona text injected after the grounding rules.
pub fn persona_text(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Teacher => {
            "ROLE: The Teacher.
TONE: Encouraging, clear, uses analogies and step-by-step breakdowns.
GOAL: Ensure deep understanding. Use Socratic questioning if the user is stuck."
        }
        AgentRole::Examiner => {
            "ROLE: The Examiner.
TONE: Strict, formal, pedantic about terminology.
GOAL: Assess against mark schemes. Rejects vague answers. Highlights \"Command Words\" (Explain vs Describe)."
        }
        AgentRole::Coach => {
            "ROLE: The Performance Coach.
TONE: Motivational, concise, focus on strategy and mindset.
GOAL: Manage burnout, suggest breaks, optimize revision strategy. Keep answers short and actionable."
        }
        AgentRole::Analyst => {
            "ROLE: The Data Analyst.
TONE: Objective, data-driven.
GOAL: Point out patterns in mistakes. Reference the user's \"Digital Twin\" history (e.g., \"You often miss marks on calculation questions\")."
        }
        AgentRole::Council => {
            "ROLE: The Council (Orchestrator).
TONE: Balanced.
GOAL: Synthesize the best response. If the user asks a concept question, explain like a Teacher but add an Examiner warning about pitfalls."
        }
    }
}

/// Adaptation text derived from the learner profile.
pub fn twin_text(twin: &DigitalTwin) -> String {
    format!(
        "USER DIGITAL TWIN PROFILE:
- Weaknesses: {}
- Recent Mood: {}
- Exam Skills: Precision ({}/100), Time Mgmt ({}/100).

ADAPTATION INSTRUCTION:
- If the user has low precision, emphasize specific terminology.
- If the user is stressed (mood), be more encouraging (unless you are the Examiner).",
        twin.weaknesses.join(", "),
        twin.recent_mood,
        twin.exam_skills.precision,
        twin.exam_skills.time_management
    )
}

/// Directive text for the enabled feature flags.
pub fn feature_directives(flags: &FeatureFlags) -> String {
    let mut directives = String::new();
    if flags.deep_reasoning() {
        directives.push_str(DEEP_REASONING_DIRECTIVE);
    }
    if flags.concise() {
        directives.push_str(CONCISE_DIRECTIVE);
    }
    directives
}

/// Ready files wrapped in start/end markers and joined by blank lines.
pub fn files_context(files: &[FileDocument]) -> String {
    files
        .iter()
        .filter(|file| file.is_ready())
        .map(|file| format!("--- FILE START: {} ---\n{}\n--- FILE END ---", file.name, file.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Full system instruction for one tutor request.
pub fn system_instruction(
    role: AgentRole,
    twin: Option<&DigitalTwin>,
    flags: &FeatureFlags,
    files: &[FileDocument],
) -> String {
    let context = files_context(files);
    let context = if context.is_empty() {
        NO_FILES_CONTEXT.to_string()
    } else {
        context
    };
    let twin = twin.map(twin_text).unwrap_or_default();
    format!(
        "{BASE_INSTRUCTION}\n\nCURRENT AGENT MODE:\n{}\n\n{twin}\n{}\n\nAVAILABLE SOURCE MATERIALS:\n{context}",
        persona_text(role),
        feature_directives(flags)
    )
}

/// Sampling temperature; the Examiner runs colder.
pub fn temperature(role: AgentRole) -> f32 {
    match role {
        AgentRole::Examiner => 0.2,
        _ => 0.7,
    }
}

/// Reasoning budget, granted only for deep reasoning without the concise variant.
pub fn thinking_budget(flags: &FeatureFlags) -> Option<u32> {
    (flags.deep_reasoning() && !flags.concise()).then_some(THINKING_BUDGET)
}
