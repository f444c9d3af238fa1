//! Persisted routing preference and runtime provider overrides.

use super::StateError;
use log::{debug, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use studyos_rs_protocol::{ProviderKind, RoutingPreference};

/// Values entered at runtime for one provider. Unset fields fall back to
/// the environment.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProviderOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ProviderOverrides {
    pub fn is_empty(&self) -> bool {
        self.credential.is_none() && self.base_url.is_none() && self.model.is_none()
    }
}

/// Everything the router persists across restarts.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StoredPreferences {
    #[serde(default)]
    pub preference: RoutingPreference,
    #[serde(default)]
    pub overrides: BTreeMap<ProviderKind, ProviderOverrides>,
}

/// Storage for router preferences.
pub trait PreferenceStore: Send + Sync {
    /// Load stored preferences; `None` when nothing was saved yet.
    fn load(&self) -> Result<Option<StoredPreferences>, StateError>;
    fn save(&self, preferences: &StoredPreferences) -> Result<(), StateError>;
}

/// Single JSON file store.
pub struct JsonPreferenceStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonPreferenceStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StateError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        info!("initialized preference store (path={})", path.display());
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }
}

impl PreferenceStore for JsonPreferenceStore {
    fn load(&self) -> Result<Option<StoredPreferences>, StateError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save(&self, preferences: &StoredPreferences) -> Result<(), StateError> {
        let _guard = self.write_lock.lock();
        // Staged write; the rename replaces the file atomically.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec_pretty(preferences)?)?;
        fs::rename(&staging, &self.path)?;
        debug!(
            "saved preferences (preference={}, overrides={})",
            preferences.preference,
            preferences.overrides.len()
        );
        Ok(())
    }
}
