//! Provider profiles and the pure resolution rule.

use serde::{Deserialize, Serialize};
use studyos_rs_protocol::{CredentialOrigin, ProviderKind, RoutingPreference};

/// Effective settings for one provider kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub kind: ProviderKind,
    pub credential: Option<String>,
    pub origin: CredentialOrigin,
    pub base_url: Option<String>,
    pub model: Option<String>,
    /// Cheaper model used for concise requests.
    pub lite_model: Option<String>,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|value| !value.trim().is_empty())
}

impl ProviderProfile {
    /// Empty profile for a kind.
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            credential: None,
            origin: CredentialOrigin::None,
            base_url: None,
            model: None,
            lite_model: None,
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>, origin: CredentialOrigin) -> Self {
        self.credential = Some(credential.into());
        self.origin = origin;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Credentialed kinds need a non-empty credential; Ollama needs a base URL and model.
    pub fn is_usable(&self) -> bool {
        if self.kind.needs_credential() {
            present(&self.credential)
        } else {
            present(&self.base_url) && present(&self.model)
        }
    }

    /// Why the profile is unusable, phrased for the user.
    pub fn unusable_reason(&self) -> Option<String> {
        if self.is_usable() {
            return None;
        }
        Some(if self.kind.needs_credential() {
            format!("No API key configured for {}", self.kind)
        } else {
            format!("{} needs both a base URL and a model", self.kind)
        })
    }
}

/// How the resolved provider was chosen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Named explicitly by the preference.
    Preferred,
    /// First usable provider in priority order.
    AutoSelected,
    /// Auto mode found nothing usable.
    Fallback,
}

/// Provider that serves the next request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedProvider {
    pub kind: ProviderKind,
    pub usable: bool,
    pub resolution: Resolution,
}

/// Resolve the serving provider from the preference and current profiles.
///
/// Auto walks [`ProviderKind::ALL`] and takes the first usable profile. When
/// none is usable it falls back to the lowest-priority credential-less kind
/// whether or not that kind is usable.
pub fn resolve(preference: RoutingPreference, profiles: &[ProviderProfile]) -> ResolvedProvider {
    let usable = |kind: ProviderKind| {
        profiles
            .iter()
            .any(|profile| profile.kind == kind && profile.is_usable())
    };
    match preference {
        RoutingPreference::Provider(kind) => ResolvedProvider {
            kind,
            usable: usable(kind),
            resolution: Resolution::Preferred,
        },
        RoutingPreference::Auto => {
            if let Some(kind) = ProviderKind::ALL.into_iter().find(|kind| usable(*kind)) {
                return ResolvedProvider {
                    kind,
                    usable: true,
                    resolution: Resolution::AutoSelected,
                };
            }
            let kind = ProviderKind::ALL
                .into_iter()
                .rev()
                .find(|kind| !kind.needs_credential())
                .unwrap_or(ProviderKind::Ollama);
            ResolvedProvider {
                kind,
                usable: false,
                resolution: Resolution::Fallback,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ProviderProfile, Resolution, resolve};
    use pretty_assertions::assert_eq;
    use studyos_rs_protocol::{CredentialOrigin, ProviderKind, RoutingPreference};

    fn profiles() -> Vec<ProviderProfile> {
        ProviderKind::ALL.into_iter().map(ProviderProfile::new).collect()
    }

    fn set(profiles: &mut [ProviderProfile], profile: ProviderProfile) {
        if let Some(slot) = profiles.iter_mut().find(|slot| slot.kind == profile.kind) {
            *slot = profile;
        }
    }

    #[test]
    fn auto_prefers_first_usable_in_priority_order() {
        let mut all = profiles();
        set(
            &mut all,
            ProviderProfile::new(ProviderKind::Anthropic)
                .with_credential("sk-ant", CredentialOrigin::Environment),
        );
        set(
            &mut all,
            ProviderProfile::new(ProviderKind::OpenAi).with_credential("sk", CredentialOrigin::Runtime),
        );
        let resolved = resolve(RoutingPreference::Auto, &all);
        assert_eq!(resolved.kind, ProviderKind::OpenAi);
        assert_eq!(resolved.resolution, Resolution::AutoSelected);
        assert_eq!(resolve(RoutingPreference::Auto, &all), resolved);
    }

    #[test]
    fn auto_with_nothing_usable_falls_back_to_ollama() {
        let mut all = profiles();
        set(
            &mut all,
            ProviderProfile::new(ProviderKind::Gemini).with_credential("  ", CredentialOrigin::Runtime),
        );
        let resolved = resolve(RoutingPreference::Auto, &all);
        assert_eq!(resolved.kind, ProviderKind::Ollama);
        assert!(!resolved.usable);
        assert_eq!(resolved.resolution, Resolution::Fallback);
    }

    #[test]
    fn explicit_preference_wins_even_when_unusable() {
        let mut all = profiles();
        set(
            &mut all,
            ProviderProfile::new(ProviderKind::Gemini).with_credential("key", CredentialOrigin::Environment),
        );
        let resolved = resolve(RoutingPreference::Provider(ProviderKind::Anthropic), &all);
        assert_eq!(resolved.kind, ProviderKind::Anthropic);
        assert!(!resolved.usable);
    }

    #[test]
    fn ollama_needs_base_url_and_model() {
        let partial = ProviderProfile::new(ProviderKind::Ollama).with_base_url("http://localhost:11434");
        assert!(!partial.is_usable());
        assert!(partial.unusable_reason().is_some());
        let full = partial.with_model("llama3");
        assert!(full.is_usable());
        let resolved = resolve(RoutingPreference::Auto, &[full]);
        assert_eq!(resolved.kind, ProviderKind::Ollama);
        assert_eq!(resolved.resolution, Resolution::AutoSelected);
    }
}
