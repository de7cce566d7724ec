//! Application configuration management.
//!
//! This module handles loading the client configuration: API base URL,
//! refresh timing, and where the session is persisted.
//!
//! Configuration is stored at `~/.config/portal-auth/config.json`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::{FileTokenStore, KeyringTokenStore, TokenStore};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "portal-auth";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Renew tokens this long before they expire
const DEFAULT_REFRESH_SKEW_SECS: u64 = 5 * 60;

/// Give up on a refresh call after this long
const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 30;

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";

const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub refresh_skew_secs: u64,
    pub refresh_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub store: StoreBackend,
    pub profile: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            refresh_skew_secs: DEFAULT_REFRESH_SKEW_SECS,
            refresh_timeout_secs: DEFAULT_REFRESH_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            store: StoreBackend::default(),
            profile: DEFAULT_PROFILE.to_string(),
        }
    }
}

impl Config {
    /// Load from the user config directory, falling back to defaults, then
    /// apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// `PORTAL_BASE_URL` and `PORTAL_PROFILE` win over the file.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("PORTAL_BASE_URL") {
            if !url.is_empty() {
                self.base_url = url;
            }
        }
        if let Ok(profile) = std::env::var("PORTAL_PROFILE") {
            if !profile.is_empty() {
                self.profile = profile;
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
        Ok(cache_dir.join(APP_NAME).join(&self.profile))
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            refresh_skew: Duration::from_secs(self.refresh_skew_secs),
            refresh_timeout: Duration::from_secs(self.refresh_timeout_secs),
        }
    }

    /// Open the configured session store for the active profile.
    pub fn token_store(&self) -> Result<Arc<dyn TokenStore>> {
        let store: Arc<dyn TokenStore> = match self.store {
            StoreBackend::File => Arc::new(FileTokenStore::new(self.cache_dir()?)),
            StoreBackend::Keyring => Arc::new(KeyringTokenStore::new(&self.profile)?),
        };
        Ok(store)
    }
}

/// Timing knobs for the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub refresh_skew: Duration,
    pub refresh_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Config::default().session_settings()
    }
}

impl SessionSettings {
    pub(crate) fn skew(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.refresh_skew).unwrap_or_else(|_| chrono::Duration::zero())
    }
}
