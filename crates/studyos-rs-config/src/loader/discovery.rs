//! Where config layers live and how each one is read.

use super::{ConfigLayer, ConfigLayerSource, LayeredConfigOptions, schema};
use crate::ConfigError;
use directories::UserDirs;
use log::{debug, trace};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// File name looked up in every local layer.
pub(super) const CONFIG_FILE_NAME: &str = "studyos.json5";
/// Per-user and per-repo directory holding [`CONFIG_FILE_NAME`].
pub(super) const CONFIG_DIR_NAME: &str = ".studyos";
#[cfg(unix)]
const SYSTEM_CONFIG: &str = "/etc/studyos/studyos.json5";

/// One place a layer may be read from.
#[derive(Debug, Clone)]
pub(super) struct LayerPlan {
    pub(super) source: ConfigLayerSource,
    pub(super) path: PathBuf,
    /// Runtime layers must exist; discovered ones are skipped when absent.
    pub(super) required: bool,
}

impl LayerPlan {
    fn discovered(source: ConfigLayerSource, path: PathBuf) -> Self {
        Self {
            source,
            path,
            required: false,
        }
    }

    /// Path used to spot the same file reached through two layers.
    pub(super) fn identity(&self) -> PathBuf {
        self.path
            .canonicalize()
            .unwrap_or_else(|_| self.path.clone())
    }

    /// Read and schema-check the layer. `None` when an optional file is absent.
    pub(super) fn read(&self) -> Result<Option<(ConfigLayer, Value)>, ConfigError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound && !self.required => {
                trace!(
                    "config layer absent (source={:?}, path={})",
                    self.source,
                    self.path.display()
                );
                return Ok(None);
            }
            Err(err) => return Err(ConfigError::ReadFailed(err)),
        };
        let value: Value = json5::from_str(&contents)?;
        let label = format!("{}({})", self.source.label(), self.path.display());
        schema::validate_layer_schema(&value, &label)?;
        debug!(
            "read config layer (source={:?}, path={})",
            self.source,
            self.path.display()
        );
        let meta = ConfigLayer {
            source: self.source,
            path: self.path.clone(),
        };
        Ok(Some((meta, value)))
    }
}

/// Every candidate layer, lowest precedence first.
pub(super) fn plan_layers(options: &LayeredConfigOptions) -> Result<Vec<LayerPlan>, ConfigError> {
    let cwd = match options.cwd.canonicalize() {
        Ok(path) => path,
        Err(err) if err.kind() == ErrorKind::NotFound => options.cwd.clone(),
        Err(err) => return Err(ConfigError::ReadFailed(err)),
    };
    let project_root = cwd
        .ancestors()
        .find(|dir| {
            options
                .project_root_markers
                .iter()
                .any(|marker| dir.join(marker).exists())
        })
        .map(Path::to_path_buf);
    debug!(
        "planning config layers (cwd={}, project_root={:?})",
        cwd.display(),
        project_root
    );

    let mut plans = Vec::new();
    let fixed = [
        (ConfigLayerSource::System, &options.system_config_path),
        (ConfigLayerSource::User, &options.user_config_path),
    ];
    for (source, path) in fixed {
        if let Some(path) = path {
            plans.push(LayerPlan::discovered(source, path.clone()));
        }
    }
    if let Some(root) = &project_root {
        plans.push(LayerPlan::discovered(
            ConfigLayerSource::Project,
            root.join(CONFIG_FILE_NAME),
        ));
    }
    plans.push(LayerPlan::discovered(
        ConfigLayerSource::Cwd,
        cwd.join(CONFIG_FILE_NAME),
    ));
    if let Some(root) = &project_root {
        plans.push(LayerPlan::discovered(
            ConfigLayerSource::Repo,
            root.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME),
        ));
    }
    plans.extend(options.runtime_paths.iter().map(|path| LayerPlan {
        source: ConfigLayerSource::Runtime,
        path: path.clone(),
        required: true,
    }));
    Ok(plans)
}

pub(super) fn system_config_path() -> Option<PathBuf> {
    #[cfg(unix)]
    {
        Some(PathBuf::from(SYSTEM_CONFIG))
    }
    #[cfg(not(unix))]
    {
        None
    }
}

/// `~/.studyos/studyos.json5`
pub(super) fn user_config_path() -> Option<PathBuf> {
    UserDirs::new().map(|dirs| dirs.home_dir().join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
