//! Provider kinds, routing preferences, and streaming fragment types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backend kinds that can serve a completion request.
///
/// Declaration order is the auto-routing priority order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Google Gemini; the only kind with web-search grounding.
    Gemini,
    /// OpenAI chat completions.
    #[serde(rename = "openai")]
    OpenAi,
    /// Anthropic messages.
    Anthropic,
    /// Local Ollama server; needs no credential.
    Ollama,
}

impl ProviderKind {
    /// All kinds in auto-routing priority order.
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Gemini,
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Ollama,
    ];

    /// Return the kind as a lowercase identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Ollama => "ollama",
        }
    }

    /// Whether the kind requires an API credential to be usable.
    pub fn needs_credential(&self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }

    /// Whether a web-search flag has any effect on this kind.
    pub fn supports_web_search(&self) -> bool {
        matches!(self, ProviderKind::Gemini)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "open_ai" | "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// User-selected routing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingPreference {
    /// Pick the first usable provider in priority order.
    #[default]
    Auto,
    /// Always route to the given provider.
    Provider(ProviderKind),
}

impl RoutingPreference {
    /// Return the preference as its persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingPreference::Auto => "auto",
            RoutingPreference::Provider(kind) => kind.as_str(),
        }
    }
}

impl fmt::Display for RoutingPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingPreference {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().eq_ignore_ascii_case("auto") {
            return Ok(RoutingPreference::Auto);
        }
        value.parse().map(RoutingPreference::Provider)
    }
}

impl Serialize for RoutingPreference {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RoutingPreference {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Where a provider credential came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CredentialOrigin {
    /// Entered by the user while the app is running.
    Runtime,
    /// Supplied by config or process environment.
    Environment,
    /// No credential present.
    #[default]
    None,
}

/// Citation link attached to a streamed response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroundingLink {
    /// Human-readable page title.
    pub title: String,
    /// Source URI; the stable de-duplication key.
    pub uri: String,
}

/// One increment of a streaming completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StreamFragment {
    /// Text delta to append.
    #[serde(default)]
    pub text: String,
    /// Grounding links reported alongside this delta.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grounding: Vec<GroundingLink>,
}

impl StreamFragment {
    /// Build a text-only fragment.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            grounding: Vec::new(),
        }
    }

    /// Build a fragment carrying only grounding links.
    pub fn grounding(grounding: Vec<GroundingLink>) -> Self {
        Self {
            text: String::new(),
            grounding,
        }
    }

    /// True when the fragment carries neither text nor grounding.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.grounding.is_empty()
    }
}

/// Merge new grounding links into an existing list, keeping the first entry per URI.
///
/// Links with an empty title or URI are ignored.
pub fn merge_grounding(current: &mut Vec<GroundingLink>, incoming: &[GroundingLink]) -> usize {
    let mut added = 0;
    for link in incoming {
        if link.uri.trim().is_empty() || link.title.trim().is_empty() {
            continue;
        }
        if current.iter().any(|existing| existing.uri == link.uri) {
            continue;
        }
        current.push(link.clone());
        added += 1;
    }
    added
}

/// Per-request feature toggles.
///
/// `deep_reasoning` and `concise` are mutually exclusive; setting one clears the other.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FeatureFlags {
    #[serde(default)]
    deep_reasoning: bool,
    #[serde(default)]
    concise: bool,
    #[serde(default)]
    web_search: bool,
}

impl FeatureFlags {
    /// Flags with everything disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable deep reasoning; enabling clears concise mode.
    pub fn set_deep_reasoning(&mut self, enabled: bool) {
        self.deep_reasoning = enabled;
        if enabled {
            self.concise = false;
        }
    }

    /// Enable or disable concise mode; enabling clears deep reasoning.
    pub fn set_concise(&mut self, enabled: bool) {
        self.concise = enabled;
        if enabled {
            self.deep_reasoning = false;
        }
    }

    /// Enable or disable web search grounding.
    pub fn set_web_search(&mut self, enabled: bool) {
        self.web_search = enabled;
    }

    /// Builder-style variant of [`FeatureFlags::set_deep_reasoning`].
    pub fn with_deep_reasoning(mut self, enabled: bool) -> Self {
        self.set_deep_reasoning(enabled);
        self
    }

    /// Builder-style variant of [`FeatureFlags::set_concise`].
    pub fn with_concise(mut self, enabled: bool) -> Self {
        self.set_concise(enabled);
        self
    }

    /// Builder-style variant of [`FeatureFlags::set_web_search`].
    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.set_web_search(enabled);
        self
    }

    pub fn deep_reasoning(&self) -> bool {
        self.deep_reasoning
    }

    pub fn concise(&self) -> bool {
        self.concise
    }

    pub fn web_search(&self) -> bool {
        self.web_search
    }

    /// Re-apply the exclusivity rule to flags that arrived over the wire.
    pub fn normalized(mut self) -> Self {
        if self.deep_reasoning && self.concise {
            self.deep_reasoning = false;
        }
        self
    }
}
