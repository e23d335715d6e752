//! Configuration file support for Treino.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/treino/config.toml`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub sync: SyncConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl DataConfig {
    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }

    pub fn outbox_path(&self) -> PathBuf {
        self.data_dir.join("outbox.jsonl")
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("history.jsonl")
    }
}

/// Active session parameters
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Seconds added by one "extend rest" press
    #[serde(default = "default_rest_extend_seconds")]
    pub rest_extend_seconds: u32,

    /// Checked core slots needed to count the core routine as done
    #[serde(default = "default_core_done_threshold")]
    pub core_done_threshold: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rest_extend_seconds: default_rest_extend_seconds(),
            core_done_threshold: default_core_done_threshold(),
        }
    }
}

/// Delivery configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Identity records are delivered under
    #[serde(default = "default_identity")]
    pub identity: String,

    /// Treat the backend as unreachable
    #[serde(default)]
    pub offline: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            identity: default_identity(),
            offline: false,
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("treino")
}

fn default_rest_extend_seconds() -> u32 {
    15
}

fn default_core_done_threshold() -> usize {
    3
}

fn default_identity() -> String {
    "local".into()
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("treino").join("config.toml")
    }

    /// Reject values the session cannot work with
    pub fn validate(&self) -> Result<()> {
        let max_slots = (crate::CoreSlot::EXERCISES * crate::CoreSlot::SETS) as usize;
        if self.session.core_done_threshold == 0 || self.session.core_done_threshold > max_slots {
            return Err(Error::Config(format!(
                "core_done_threshold must be between 1 and {}, got {}",
                max_slots, self.session.core_done_threshold
            )));
        }
        if self.sync.identity.trim().is_empty() {
            return Err(Error::Config("sync.identity must not be empty".into()));
        }
        Ok(())
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
