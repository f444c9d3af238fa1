//! Configuration schema for Study OS.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use studyos_rs_protocol::{AgentRole, ProviderKind, RoutingPreference};

/// Default phrases that suggest outside help or prompt injection in exam answers.
pub const DEFAULT_DENYLIST: &[&str] = &[
    "hey google",
    "chatgpt",
    "help me",
    "what is the answer",
    "ignore previous instructions",
    "as an ai",
    "system prompt",
];

/// Extensions accepted by the upload validator.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[".txt", ".md", ".csv", ".json", ".pdf", ".docx"];

/// Root config for Study OS.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StudyOsConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub exam: ExamConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub state: StateConfig,
}

impl StudyOsConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> StudyOsConfigBuilder {
        StudyOsConfigBuilder::new()
    }
}

/// Builder for assembling a `StudyOsConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct StudyOsConfigBuilder {
    config: StudyOsConfig,
}

impl StudyOsConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: StudyOsConfig::default(),
        }
    }

    /// Set the initial routing preference.
    pub fn routing(mut self, preference: RoutingPreference) -> Self {
        self.config.routing.preference = preference;
        self
    }

    /// Replace the settings for one provider kind.
    pub fn provider(mut self, kind: ProviderKind, provider: ProviderConfig) -> Self {
        *self.config.providers.get_mut(kind) = provider;
        self
    }

    /// Replace the exam configuration.
    pub fn exam(mut self, exam: ExamConfig) -> Self {
        self.config.exam = exam;
        self
    }

    /// Replace the chat configuration.
    pub fn chat(mut self, chat: ChatConfig) -> Self {
        self.config.chat = chat;
        self
    }

    /// Replace the upload validation configuration.
    pub fn uploads(mut self, uploads: UploadsConfig) -> Self {
        self.config.uploads = uploads;
        self
    }

    /// Replace the HTTP server configuration.
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.config.server = server;
        self
    }

    /// Replace the persistence configuration.
    pub fn state(mut self, state: StateConfig) -> Self {
        self.config.state = state;
        self
    }

    /// Finalize and return the built `StudyOsConfig`.
    pub fn build(self) -> StudyOsConfig {
        self.config
    }
}

/// Routing mode applied until the user picks another one.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoutingConfig {
    #[serde(default)]
    pub preference: RoutingPreference,
}

/// Raw per-provider settings as written in config files.
///
/// Every field is optional so partial layers merge cleanly; kind-specific
/// defaults are applied by [`ProvidersConfig::resolved`].
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Credential supplied by deployment config.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variables consulted for the credential, in order.
    #[serde(default)]
    pub api_key_env: Option<Vec<String>>,
    #[serde(default)]
    pub model: Option<String>,
    /// Cheaper model used for concise requests.
    #[serde(default)]
    pub lite_model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable consulted for the base URL.
    #[serde(default)]
    pub base_url_env: Option<String>,
    /// Environment variable consulted for the model.
    #[serde(default)]
    pub model_env: Option<String>,
}

/// Settings for all provider kinds.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub gemini: ProviderConfig,
    #[serde(default)]
    pub openai: ProviderConfig,
    #[serde(default)]
    pub anthropic: ProviderConfig,
    #[serde(default)]
    pub ollama: ProviderConfig,
}

/// Provider settings with kind-specific defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub api_key: Option<String>,
    pub api_key_env: Vec<String>,
    pub model: Option<String>,
    pub lite_model: Option<String>,
    pub base_url: Option<String>,
    pub base_url_env: Option<String>,
    pub model_env: Option<String>,
}

impl ProvidersConfig {
    /// Raw settings for a kind.
    pub fn get(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::Gemini => &self.gemini,
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Anthropic => &self.anthropic,
            ProviderKind::Ollama => &self.ollama,
        }
    }

    /// Mutable raw settings for a kind.
    pub fn get_mut(&mut self, kind: ProviderKind) -> &mut ProviderConfig {
        match kind {
            ProviderKind::Gemini => &mut self.gemini,
            ProviderKind::OpenAi => &mut self.openai,
            ProviderKind::Anthropic => &mut self.anthropic,
            ProviderKind::Ollama => &mut self.ollama,
        }
    }

    /// Settings for a kind with defaults applied to every unset field.
    pub fn resolved(&self, kind: ProviderKind) -> ProviderSettings {
        let raw = self.get(kind).clone();
        let defaults = provider_defaults(kind);
        ProviderSettings {
            kind,
            api_key: raw.api_key.filter(|key| !key.trim().is_empty()),
            api_key_env: raw.api_key_env.unwrap_or(defaults.api_key_env),
            model: raw.model.or(defaults.model),
            lite_model: raw.lite_model.or(defaults.lite_model),
            base_url: raw.base_url.or(defaults.base_url),
            base_url_env: raw.base_url_env.or(defaults.base_url_env),
            model_env: raw.model_env.or(defaults.model_env),
        }
    }
}

fn provider_defaults(kind: ProviderKind) -> ProviderSettings {
    let owned = |values: &[&str]| values.iter().map(|value| value.to_string()).collect();
    match kind {
        ProviderKind::Gemini => ProviderSettings {
            kind,
            api_key: None,
            api_key_env: owned(&["GEMINI_API_KEY", "API_KEY"]),
            model: Some("gemini-3-flash-preview".to_string()),
            lite_model: Some("gemini-flash-lite-latest".to_string()),
            base_url: Some("https://generativelanguage.googleapis.com/v1beta".to_string()),
            base_url_env: None,
            model_env: None,
        },
        ProviderKind::OpenAi => ProviderSettings {
            kind,
            api_key: None,
            api_key_env: owned(&["OPENAI_API_KEY"]),
            model: Some("gpt-4.1".to_string()),
            lite_model: Some("gpt-4.1-mini".to_string()),
            base_url: None,
            base_url_env: None,
            model_env: None,
        },
        ProviderKind::Anthropic => ProviderSettings {
            kind,
            api_key: None,
            api_key_env: owned(&["ANTHROPIC_API_KEY"]),
            model: Some("claude-sonnet-4-5".to_string()),
            lite_model: Some("claude-haiku-4-5".to_string()),
            base_url: None,
            base_url_env: None,
            model_env: None,
        },
        ProviderKind::Ollama => ProviderSettings {
            kind,
            api_key: None,
            api_key_env: Vec::new(),
            model: None,
            lite_model: None,
            base_url: None,
            base_url_env: Some("OLLAMA_BASE_URL".to_string()),
            model_env: Some("OLLAMA_MODEL".to_string()),
        },
    }
}

/// Proctored exam settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamConfig {
    #[serde(default = "default_exam_topic")]
    pub topic: String,
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: u32,
    /// Violation count that ends the session.
    #[serde(default = "default_max_violations")]
    pub max_violations: u32,
    #[serde(default = "default_warning_clear_ms")]
    pub warning_clear_ms: u64,
    #[serde(default = "default_disqualify_delay_ms")]
    pub disqualify_delay_ms: u64,
    /// Case-insensitive phrases flagged in free-text answers.
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,
}

impl Default for ExamConfig {
    fn default() -> Self {
        Self {
            topic: default_exam_topic(),
            duration_minutes: default_duration_minutes(),
            max_violations: default_max_violations(),
            warning_clear_ms: default_warning_clear_ms(),
            disqualify_delay_ms: default_disqualify_delay_ms(),
            denylist: default_denylist(),
        }
    }
}

fn default_exam_topic() -> String {
    "Cell Biology & Transport".to_string()
}

fn default_duration_minutes() -> u32 {
    10
}

fn default_max_violations() -> u32 {
    3
}

fn default_warning_clear_ms() -> u64 {
    4_000
}

fn default_disqualify_delay_ms() -> u64 {
    1_500
}

fn default_denylist() -> Vec<String> {
    DEFAULT_DENYLIST
        .iter()
        .map(|phrase| phrase.to_string())
        .collect()
}

/// Chat transcript settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Messages kept when a transcript is restored.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default)]
    pub default_persona: AgentRole,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            default_persona: AgentRole::default(),
        }
    }
}

fn default_history_limit() -> usize {
    60
}

/// Upload validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

fn default_max_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    DEFAULT_ALLOWED_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3001".to_string()
}

/// Local persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StateConfig {
    /// Root directory for preferences and transcripts; defaults to the user data dir.
    #[serde(default)]
    pub root: Option<PathBuf>,
}
