//! Application configuration management.
//!
//! This module handles loading the application configuration:
//! the API base URL, request timeout and data directory. User preferences
//! such as the selected school live in the store, see `settings`.
//!
//! Configuration is stored at `~/.config/schoolday/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::client::{DEFAULT_BASE_URL, REQUEST_TIMEOUT_SECS};

/// Application name used for config/data directory paths
const APP_NAME: &str = "schoolday";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Store file name inside the data directory
const STORE_FILE: &str = "store.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub data_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(REQUEST_TIMEOUT_SECS))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn store_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(STORE_FILE))
    }

    pub fn log_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_paths_follow_data_dir() {
        let config = Config {
            data_dir: Some(PathBuf::from("/tmp/schoolday-test")),
            ..Default::default()
        };
        assert_eq!(config.store_path().unwrap(), PathBuf::from("/tmp/schoolday-test/store.json"));
        assert_eq!(config.log_dir().unwrap(), PathBuf::from("/tmp/schoolday-test/logs"));
    }

    #[test]
    fn test_partial_config_parses() {
        let json = r#"{"api_base_url":"http://localhost:8080"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.base_url(), "http://localhost:8080");
        assert_eq!(config.data_dir, None);
    }
}
