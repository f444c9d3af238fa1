//! Public SDK surface for Study OS.
//!
//! This crate re-exports the building blocks and wires them together the way
//! the `studyos` binary does: config loading, a router backed by the real
//! provider clients, and the on-disk stores under the state root.

/// Re-export for convenience.
pub use studyos_rs_config as config;
pub use studyos_rs_core as core;
/// Re-export for convenience.
pub use studyos_rs_protocol as protocol;
pub use studyos_rs_server as server;

use anyhow::Context;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use studyos_rs_config::StudyOsConfig;
use studyos_rs_core::state::{
    JsonPreferenceStore, JsonlTranscriptStore, PREFERENCES_FILE, TRANSCRIPTS_DIR, TranscriptStore,
    resolve_state_root,
};
use studyos_rs_core::{DefaultBackendFactory, ProviderRouter};

#[inline]
/// Initialize logging using env_logger if the "logging" feature is enabled.
///
/// This is a no-op if the feature is not enabled. Binaries are still expected
/// to call this early in startup to ensure log output is wired up.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::builder()
            .format_timestamp_millis()
            .parse_default_env()
            .try_init();
    }
}

/// Load an explicit config file, or the layered stack rooted at `cwd`.
pub fn load_config(path: Option<&Path>, cwd: &Path) -> anyhow::Result<StudyOsConfig> {
    if let Some(path) = path {
        return StudyOsConfig::load_from_path(path)
            .with_context(|| format!("failed to load config from {}", path.display()));
    }
    let layered = StudyOsConfig::load_layered(cwd).context("failed to load layered config")?;
    debug!("layered config loaded (layers={})", layered.layers.len());
    Ok(layered.config)
}

/// Directory holding preferences and transcripts.
pub fn state_root(config: &StudyOsConfig) -> Option<PathBuf> {
    resolve_state_root(&config.state)
}

/// Router over the real provider clients.
///
/// With `persist` set, saved preferences are applied and later changes are
/// written back under the state root.
pub fn open_router(config: &StudyOsConfig, persist: bool) -> anyhow::Result<Arc<ProviderRouter>> {
    let factory = DefaultBackendFactory::new().context("failed to build HTTP client")?;
    let mut router = ProviderRouter::from_config(config, Arc::new(factory));
    if persist && let Some(root) = state_root(config) {
        let store = JsonPreferenceStore::new(root.join(PREFERENCES_FILE))
            .context("failed to open preference store")?;
        router = router.with_preference_store(Arc::new(store));
    }
    Ok(Arc::new(router))
}

/// Transcript store under the state root, if one can be resolved.
pub fn open_transcripts(config: &StudyOsConfig) -> anyhow::Result<Option<Arc<dyn TranscriptStore>>> {
    let Some(root) = state_root(config) else {
        info!("no state root available; transcripts stay in memory");
        return Ok(None);
    };
    let store = JsonlTranscriptStore::new(root.join(TRANSCRIPTS_DIR))
        .context("failed to open transcript store")?;
    Ok(Some(Arc::new(store)))
}

#[cfg(test)]
mod tests {
    use super::{load_config, open_router, open_transcripts};
    use pretty_assertions::assert_eq;
    use studyos_rs_config::StateConfig;

    #[test]
    fn explicit_config_path_is_used() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("studyos.json5");
        std::fs::write(&path, "{ exam: { duration_minutes: 25 } }").expect("write");
        let config = load_config(Some(&path), dir.path()).expect("config");
        assert_eq!(config.exam.duration_minutes, 25);
    }

    #[test]
    fn stores_live_under_configured_state_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = studyos_rs_config::StudyOsConfig::default();
        config.state = StateConfig {
            root: Some(dir.path().to_path_buf()),
        };
        let router = open_router(&config, true).expect("router");
        router.set_preference("ollama".parse().expect("preference"));
        assert!(dir.path().join("preferences.json").exists());
        assert!(open_transcripts(&config).expect("store").is_some());
        assert!(dir.path().join("transcripts").exists());
    }
}
