//! Configuration loading from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use docline_core::{ClientConfig, ExtractionConfig};

/// Global configuration for docline
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub client: ClientConfig,
    pub extraction: ExtractionConfig,
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./docline.toml
    /// 2. ~/.config/docline/config.toml
    ///
    /// Falls back to defaults when neither exists.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("docline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(dirs) = directories::ProjectDirs::from("", "", "docline") {
            let user_config = dirs.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .client
            .monitor_config()
            .validate()
            .with_context(|| format!("Invalid [client] section in {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}
