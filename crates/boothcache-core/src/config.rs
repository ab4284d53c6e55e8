//! Application configuration management.
//!
//! Configuration is stored at `~/.config/boothcache/config.json` and holds
//! the backend location, the API key, and sync tuning.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::sync::{SyncSettings, DEFAULT_DEBOUNCE_MS};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "boothcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Trailing debounce window for push-triggered reloads.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Start in offline mode (serve snapshots, no network until told otherwise).
    #[serde(default)]
    pub offline: bool,
    /// Override for the snapshot directory.
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: None,
            api_key: None,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            offline: false,
            snapshot_dir: None,
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
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents).with_context(|| format!("Invalid config in {}", path.display()))
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
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding offline snapshots.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.snapshot_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Apply command-line or environment values over the file values.
    pub fn with_overrides(mut self, backend_url: Option<String>, api_key: Option<String>) -> Self {
        if backend_url.is_some() {
            self.backend_url = backend_url;
        }
        if api_key.is_some() {
            self.api_key = api_key;
        }
        self
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }
}
