//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_CONTROL_PLANE_URL: &str = "http://localhost:5000";
pub const DEFAULT_AGENT_URL: &str = "http://localhost:8080";
pub const DEFAULT_HISTORY_DIR: &str = "history";

/// CLI configuration, read from `~/.config/scalerctl/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub control_plane_url: Option<String>,
    pub agent_url: Option<String>,
    pub history_dir: Option<String>,
}

impl Config {
    /// Load configuration from file; a missing file is an empty configuration
    pub fn load() -> Result<Self> {
        let config_path = match Self::config_path() {
            Some(path) => path,
            None => return Ok(Self::default()),
        };

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("scalerctl").join("config.json"))
    }

    /// Flag or environment value first, then the file, then the default
    pub fn control_plane_url(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.control_plane_url.clone())
            .unwrap_or_else(|| DEFAULT_CONTROL_PLANE_URL.to_string())
    }

    pub fn agent_url(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.agent_url.clone())
            .unwrap_or_else(|| DEFAULT_AGENT_URL.to_string())
    }

    pub fn history_dir(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.history_dir.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_HISTORY_DIR))
    }
}
