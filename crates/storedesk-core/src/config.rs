//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the API base URL, per-endpoint timeouts, UI preferences
//! and the last used username.
//!
//! Configuration is stored at `~/.config/storedesk/config.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::base_url::normalize;
use crate::api::TimeoutSettings;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "storedesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Cached user profile file name
const USER_DATA_FILE: &str = "user-data.json";

/// Compiled fallback when neither the environment nor the config file name
/// an API.
pub const DEFAULT_API_URL: &str = "https://jamrock-api.up.railway.app/api";

/// Environment variable that overrides the configured API URL.
pub const API_URL_ENV: &str = "STOREDESK_API_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: Option<String>,
    pub theme: String,
    /// Dashboard auto-refresh interval in seconds
    pub auto_refresh_interval: u64,
    pub last_username: Option<String>,
    pub timeouts: TimeoutSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: None,
            theme: "dark".to_string(),
            auto_refresh_interval: 30,
            last_username: None,
            timeouts: TimeoutSettings::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
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

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Environment override, then the stored URL, then the compiled default.
    pub fn resolved_api_url(&self) -> String {
        self.api_url_with_override(std::env::var(API_URL_ENV).ok())
    }

    fn api_url_with_override(&self, env_url: Option<String>) -> String {
        env_url
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.api_url.clone())
            .map(|url| normalize(&url))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    fn app_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::app_config_dir()?.join(CONFIG_FILE))
    }

    pub fn user_data_path() -> Result<PathBuf> {
        Ok(Self::app_config_dir()?.join(USER_DATA_FILE))
    }

    pub fn cache_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

/// Persistent settings the session layer reads and writes.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Base URL to use at startup.
    async fn resolve_api_url(&self) -> Result<String>;

    async fn save_api_url(&self, url: &str) -> Result<()>;

    async fn last_username(&self) -> Result<Option<String>>;

    async fn save_last_username(&self, username: &str) -> Result<()>;
}

/// `SettingsStore` backed by the JSON config file.
#[derive(Debug, Clone)]
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Settings at the standard config location.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Config::config_path()?))
    }

    pub fn load(&self) -> Result<Config> {
        Config::load_from(&self.path)
    }

    fn update(&self, apply: impl FnOnce(&mut Config)) -> Result<()> {
        let mut config = self.load()?;
        apply(&mut config);
        config.save_to(&self.path)
    }
}

#[async_trait]
impl SettingsStore for FileSettings {
    async fn resolve_api_url(&self) -> Result<String> {
        Ok(self.load()?.resolved_api_url())
    }

    async fn save_api_url(&self, url: &str) -> Result<()> {
        let url = normalize(url);
        self.update(|config| config.api_url = Some(url))
    }

    async fn last_username(&self) -> Result<Option<String>> {
        Ok(self.load()?.last_username)
    }

    async fn save_last_username(&self, username: &str) -> Result<()> {
        let username = username.to_string();
        self.update(|config| config.last_username = Some(username))
    }
}
