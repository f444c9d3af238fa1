//! Layered configuration loader.
//!
//! Layers are read lowest precedence first (system, user, project root, cwd,
//! repo `.studyos`, then runtime overrides). Each is schema-checked on its own
//! so errors name the file that caused them, then objects are merged key by
//! key and the result is decoded and validated as a whole.

mod discovery;
mod merge;
mod schema;

#[cfg(test)]
mod tests;

use crate::{ConfigError, StudyOsConfig};
use discovery::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use log::{debug, info};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Effective config plus the layers that produced it.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub config: StudyOsConfig,
    /// Layers that were found, lowest precedence first.
    pub layers: Vec<ConfigLayer>,
}

/// Where a layer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayerSource {
    System,
    User,
    /// `studyos.json5` at the project root.
    Project,
    Cwd,
    /// `.studyos/studyos.json5` at the project root.
    Repo,
    /// Explicit override files; these must exist.
    Runtime,
}

impl ConfigLayerSource {
    /// Prefix used in schema error paths.
    pub fn label(self) -> &'static str {
        match self {
            ConfigLayerSource::System => "system",
            ConfigLayerSource::User => "user",
            ConfigLayerSource::Project => "project",
            ConfigLayerSource::Cwd => "cwd",
            ConfigLayerSource::Repo => "repo",
            ConfigLayerSource::Runtime => "runtime",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigLayer {
    pub source: ConfigLayerSource,
    pub path: PathBuf,
}

/// Layer locations for [`StudyOsConfig::load_layered_with_options`].
#[derive(Debug, Clone)]
pub struct LayeredConfigOptions {
    pub cwd: PathBuf,
    /// Defaults to `/etc/studyos/studyos.json5` on Unix.
    pub system_config_path: Option<PathBuf>,
    /// Defaults to `~/.studyos/studyos.json5`.
    pub user_config_path: Option<PathBuf>,
    pub runtime_paths: Vec<PathBuf>,
    /// Entries whose presence marks the project root.
    pub project_root_markers: Vec<String>,
}

impl LayeredConfigOptions {
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            system_config_path: discovery::system_config_path(),
            user_config_path: discovery::user_config_path(),
            runtime_paths: Vec::new(),
            project_root_markers: vec![".git".to_string()],
        }
    }

    /// Append an override file applied after every discovered layer.
    pub fn with_runtime_path(mut self, path: impl AsRef<Path>) -> Self {
        self.runtime_paths.push(path.as_ref().to_path_buf());
        self
    }
}

/// Merged document and the layers folded into it.
#[derive(Default)]
struct LayerStack {
    merged: Map<String, Value>,
    seen: HashSet<PathBuf>,
    layers: Vec<ConfigLayer>,
}

impl LayerStack {
    fn push(&mut self, identity: PathBuf, layer: ConfigLayer, value: Value) {
        if !self.seen.insert(identity) {
            debug!(
                "skipping layer already loaded (source={:?}, path={})",
                layer.source,
                layer.path.display()
            );
            return;
        }
        let mut merged = Value::Object(std::mem::take(&mut self.merged));
        merge::merge_json_values(&mut merged, &value);
        if let Value::Object(map) = merged {
            self.merged = map;
        }
        self.layers.push(layer);
    }
}

impl StudyOsConfig {
    /// Load one file without layering.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("loading config file (path={})", path.display());
        Self::load_from_str(&fs::read_to_string(path)?)
    }

    /// Load one JSON5 document without layering.
    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        debug!("parsing config (len={})", contents.len());
        decode(json5::from_str(contents)?, "config")
    }

    /// Load the default layer stack for `cwd`.
    pub fn load_layered(cwd: impl AsRef<Path>) -> Result<LayeredConfig, ConfigError> {
        Self::load_layered_with_options(LayeredConfigOptions::new(cwd))
    }

    pub fn load_layered_with_options(
        options: LayeredConfigOptions,
    ) -> Result<LayeredConfig, ConfigError> {
        let mut stack = LayerStack::default();
        for plan in discovery::plan_layers(&options)? {
            if let Some((layer, value)) = plan.read()? {
                stack.push(plan.identity(), layer, value);
            }
        }
        let config = decode(Value::Object(stack.merged), "effective")?;
        info!(
            "loaded layered config (cwd={}, layers={})",
            options.cwd.display(),
            stack.layers.len()
        );
        Ok(LayeredConfig {
            config,
            layers: stack.layers,
        })
    }

    /// Semantic checks the schema cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let minimums = [
            ("exam.max_violations", self.exam.max_violations == 0, "must be at least 1"),
            ("exam.duration_minutes", self.exam.duration_minutes == 0, "must be at least 1"),
            ("uploads.max_bytes", self.uploads.max_bytes == 0, "must be greater than 0"),
        ];
        if let Some((path, _, message)) = minimums.into_iter().find(|(_, failed, _)| *failed) {
            return Err(ConfigError::InvalidField {
                path: path.to_string(),
                message: message.to_string(),
            });
        }
        match self
            .uploads
            .allowed_extensions
            .iter()
            .find(|ext| !ext.starts_with('.'))
        {
            Some(ext) => Err(ConfigError::Invalid(format!(
                "upload extension must start with '.': {ext}"
            ))),
            None => Ok(()),
        }
    }
}

fn decode(value: Value, label: &str) -> Result<StudyOsConfig, ConfigError> {
    schema::validate_layer_schema(&value, label)?;
    let config: StudyOsConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}
