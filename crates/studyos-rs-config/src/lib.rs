//! Study OS configuration.
//!
//! JSON5 files describe provider credentials and models, exam integrity
//! limits, upload rules, the server bind address and where local state lives.
//! See [`StudyOsConfig::load_layered`] for how files are discovered.

mod error;
mod loader;
mod model;

pub use error::ConfigError;
pub use loader::{ConfigLayer, ConfigLayerSource, LayeredConfig, LayeredConfigOptions};
pub use model::*;
