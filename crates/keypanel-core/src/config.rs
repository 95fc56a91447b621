//! Application configuration management.
//!
//! Holds the panel base URL, transport timeout, refresh retry bound and the
//! session store backend. Stored at `~/.config/keypanel/config.json`; the
//! `KEYPANEL_URL` environment variable overrides the base URL.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::refresh::DEFAULT_MAX_AUTH_ATTEMPTS;
use crate::auth::{FileSessionStore, KeyringSessionStore, SessionStore};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "keypanel";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `base_url`
pub const BASE_URL_ENV: &str = "KEYPANEL_URL";

const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// HTTP request timeout in seconds.
/// Also the only bound on how long a refresh exchange can block a request.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Where the session survives between runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    File,
    Keyring,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_max_auth_attempts() -> u32 {
    DEFAULT_MAX_AUTH_ATTEMPTS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_auth_attempts")]
    pub max_auth_attempts: u32,
    #[serde(default)]
    pub store: StoreBackend,
    #[serde(default)]
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_timeout(),
            max_auth_attempts: default_max_auth_attempts(),
            store: StoreBackend::default(),
            last_username: None,
        }
    }
}

impl Config {
    /// Load from disk (defaults when absent), then apply env overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Self::from_json(&contents)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("Failed to parse config file")
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

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                debug!(url = %url, "Base URL overridden from environment");
                self.base_url = url.trim().to_string();
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Open the configured session store
    pub fn open_store(&self) -> Result<Arc<dyn SessionStore>> {
        let store: Arc<dyn SessionStore> = match self.store {
            StoreBackend::File => {
                let dir = self.cache_dir()?;
                Arc::new(FileSessionStore::open(&dir).with_context(|| {
                    format!("Failed to open session file in {}", dir.display())
                })?)
            }
            StoreBackend::Keyring => Arc::new(KeyringSessionStore::new()),
        };
        Ok(store)
    }
}
