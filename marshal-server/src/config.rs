//! Controller configuration loading.
//!
//! Lookup order: the `--config` path, then `config.json` in the user
//! configuration directory, then the built-in defaults. Whatever is loaded
//! is validated before the controller starts.

use log::{debug, info};
use std::path::{Path, PathBuf};

use marshal_core::ControllerConfig;

use crate::MarshalError;

const CONFIG_FILE: &str = "config.json";

/// Default location of the configuration file, if the platform has one.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "traffic-marshal", "marshal")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Load and validate the controller configuration.
///
/// An explicit path must exist; the default path is optional.
pub fn load_config(path: Option<&Path>) -> Result<ControllerConfig, MarshalError> {
    match path {
        Some(path) => read_config(path),
        None => match default_config_path() {
            Some(path) if path.exists() => read_config(&path),
            _ => {
                debug!("No configuration file, using defaults");
                let config = ControllerConfig::default();
                config.validate()?;
                Ok(config)
            }
        },
    }
}

fn read_config(path: &Path) -> Result<ControllerConfig, MarshalError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| MarshalError::ConfigFile(path.to_path_buf(), e))?;
    let config = ControllerConfig::from_json(&text)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}
