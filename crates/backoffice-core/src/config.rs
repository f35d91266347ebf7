//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the API base URL, the durable credential backend, the
//! request timeout and the last email used to log in.
//!
//! Configuration is stored at `~/.config/backoffice/config.json`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::{DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::auth::{FileStorage, KeyringStorage, StorageTier};

/// Application name used for config/data/cache directory paths
pub const APP_NAME: &str = "backoffice";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Durable credential file name in the data directory
const CREDENTIALS_FILE: &str = "credentials.json";

/// Environment variable overriding the API base URL
pub const API_URL_ENV: &str = "BACKOFFICE_API_URL";

/// Where the durable credential tier is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurableBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub base_url: Option<String>,
    pub durable_backend: DurableBackend,
    pub request_timeout_secs: Option<u64>,
    pub last_email: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Base URL: command-line override, then environment, then config file,
    /// then the default. Blank values at any level are skipped.
    pub fn base_url(&self, cli_override: Option<String>) -> String {
        self.resolve_base_url(cli_override, std::env::var(API_URL_ENV).ok())
    }

    fn resolve_base_url(&self, cli_override: Option<String>, env_override: Option<String>) -> String {
        normalize_url(cli_override)
            .or_else(|| normalize_url(env_override))
            .or_else(|| normalize_url(self.base_url.clone()))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn log_dir(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join("logs"))
    }

    /// Build the durable credential tier this config selects.
    pub fn durable_storage(&self) -> Result<Arc<dyn StorageTier>> {
        Ok(match self.durable_backend {
            DurableBackend::File => {
                Arc::new(FileStorage::new(self.data_dir()?.join(CREDENTIALS_FILE)))
            }
            DurableBackend::Keyring => Arc::new(
                KeyringStorage::open(APP_NAME)
                    .context("The OS keychain cannot persist credentials; use the file backend")?,
            ),
        })
    }
}

fn normalize_url(url: Option<String>) -> Option<String> {
    url.map(|url| url.trim().trim_end_matches('/').to_string())
        .filter(|url| !url.is_empty())
}
