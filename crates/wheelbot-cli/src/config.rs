use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use wheelbot_scripting_host::ScriptingConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found")]
    NotFound,

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("io error reading config: {0}")]
    Io(String),
}

/// The config file. The bot synchronizes against
/// `users/{user_id}/devices/{device_id}` at the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WheelbotConfig {
    pub user_id: String,
    pub device_id: String,

    #[serde(default)]
    pub scripting: ScriptingConfig,
}

impl WheelbotConfig {
    /// Default location in the platform config directory.
    pub fn config_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "wheelbot")
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("wheelbot.toml"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound);
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config = toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

/// Write a commented starter config for the user to edit.
pub fn create_example_config(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let example_config = r#"# Wheelbot configuration
# The bot syncs its state against users/{user_id}/devices/{device_id}.
user_id = "user"
device_id = "tank-1"

[scripting]
tick_interval_ms = 250
timeout_ms = 1000
"#;

    fs::write(path, example_config)
}
