//! Configuration loading
//!
//! A TOML file under the user config directory, with environment overrides
//! for the settings that change per invocation in practice. Command-line
//! flags win over both.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

static GLOBAL: OnceCell<Config> = OnceCell::new();

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the schema-resolver / export-executor service.
    pub service_url: String,
    /// Dataset exports are written into unless overridden.
    pub dataset: String,
    /// Starting row ceiling for preview negotiation.
    pub max_rows: u64,
    /// Re-preview automatically whenever the slice changes.
    pub auto_refresh: bool,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:8080".to_string(),
            dataset: "default".to_string(),
            max_rows: crate::engine::DEFAULT_MAX_ROWS,
            auto_refresh: false,
            timeout_secs: 30,
        }
    }
}

impl Config {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dbslice")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// One line per committed export gets appended here.
    pub fn history_path() -> PathBuf {
        Self::config_dir().join("history.log")
    }

    /// Read the config file if present, then apply `DBSLICE_URL` and
    /// `DBSLICE_DATASET` overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(url) = std::env::var("DBSLICE_URL") {
            if !url.trim().is_empty() {
                config.service_url = url;
            }
        }
        if let Ok(dataset) = std::env::var("DBSLICE_DATASET") {
            if !dataset.trim().is_empty() {
                config.dataset = dataset;
            }
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(Self::config_path(), content)
            .with_context(|| format!("Failed to write config file: {}", Self::config_path().display()))
    }
}

/// Install the loaded config for the rest of the process.
pub fn init_global(config: Config) {
    let _ = GLOBAL.set(config);
}

pub fn global() -> &'static Config {
    GLOBAL.get_or_init(|| Config::load().unwrap_or_default())
}
