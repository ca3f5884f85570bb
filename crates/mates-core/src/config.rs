//! Application configuration management.
//!
//! Configuration covers session behaviour (development auto-login, timeouts,
//! simulated latency, whether to persist the session) plus a few conveniences
//! for front ends such as the last email used to sign in.
//!
//! Configuration is stored at `~/.config/mates-events/config.json`. Missing
//! fields fall back to their defaults, so an empty file is a valid config.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::manager::{DEFAULT_OPERATION_TIMEOUT_SECS, DEFAULT_RESTORE_DELAY_MS};
use crate::auth::{FileSessionStore, MemorySessionStore, SessionConfig, SessionStore};
use crate::backend::simulated::DEFAULT_LATENCY_MS;

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "mates-events";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sign in as a placeholder user at startup instead of restoring
    pub auto_login_for_development: bool,
    pub operation_timeout_secs: u64,
    pub simulated_latency_ms: u64,
    pub restore_delay_ms: u64,
    /// Keep the session on disk so it survives restarts
    pub persist_session: bool,
    pub last_email: Option<String>,
    /// Write logs to daily files in this directory instead of stderr
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auto_login_for_development: false,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            simulated_latency_ms: DEFAULT_LATENCY_MS,
            restore_delay_ms: DEFAULT_RESTORE_DELAY_MS,
            persist_session: false,
            last_email: None,
            log_dir: None,
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
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
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

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            auto_login_for_development: self.auto_login_for_development,
            operation_timeout: Duration::from_secs(self.operation_timeout_secs),
            restore_delay: Duration::from_millis(self.restore_delay_ms),
        }
    }

    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.simulated_latency_ms)
    }

    /// Session store selected by `persist_session`
    pub fn session_store(&self) -> Result<Arc<dyn SessionStore>> {
        if self.persist_session {
            Ok(Arc::new(FileSessionStore::new(self.cache_dir()?)))
        } else {
            Ok(Arc::new(MemorySessionStore::new()))
        }
    }
}
