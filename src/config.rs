//! Device configuration
//!
//! Loaded from `<data-dir>/warden.toml`. Missing file means defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use warden_shared::{defaults, LexiconError};

use crate::records::RecordError;

/// Errors that abort startup
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Could not determine home directory")]
    NoHome,

    #[error("Device is not configured: no primary or setup record in {0}")]
    Unconfigured(PathBuf),

    #[error("Unreadable record: {0}")]
    Record(#[from] RecordError),

    #[error("Lexicon failed to load: {0}")]
    Lexicon(#[from] LexiconError),
}

/// Device configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DeviceConfig {
    /// Root of all device state
    pub data_dir: PathBuf,
    /// Interpreter used to launch device scripts
    pub shell: String,
    /// Workers in the immediate job pool
    pub immediate_pool_size: usize,
    /// Pause after an intruder capture, in seconds
    pub secure_cooldown_secs: u64,
    /// Delay before re-polling motion after a failed poll, in milliseconds
    pub secure_retry_ms: u64,
    /// One-time PIN poll interval, in seconds
    pub pin_poll_interval_secs: u64,
    /// Play audible and LED cues
    pub cues_enabled: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            shell: "sh".into(),
            immediate_pool_size: defaults::IMMEDIATE_POOL_SIZE,
            secure_cooldown_secs: defaults::SECURE_COOLDOWN_SECS,
            secure_retry_ms: defaults::SECURE_RETRY_MS,
            pin_poll_interval_secs: defaults::PIN_POLL_INTERVAL_SECS,
            cues_enabled: true,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".warden"))
        .unwrap_or_else(|| PathBuf::from(".warden"))
}

impl DeviceConfig {
    /// Load `<data_dir>/warden.toml`, falling back to defaults if absent
    pub fn load(data_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let data_dir = match data_dir {
            Some(dir) => dir.to_path_buf(),
            None => dirs::home_dir().ok_or(ConfigError::NoHome)?.join(".warden"),
        };
        let path = data_dir.join("warden.toml");

        if !path.exists() {
            return Ok(Self {
                data_dir,
                ..Default::default()
            });
        }

        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        let mut config: Self =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })?;

        // An explicit directory wins over the file's own setting
        if config.data_dir == default_data_dir() {
            config.data_dir = data_dir;
        }
        if config.immediate_pool_size == 0 {
            config.immediate_pool_size = 1;
        }

        Ok(config)
    }

    pub fn record_dir(&self) -> PathBuf {
        self.data_dir.join("config")
    }

    pub fn script_dir(&self) -> PathBuf {
        self.data_dir.join("scripts")
    }

    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }

    pub fn media_dir(&self) -> PathBuf {
        self.data_dir.join("media")
    }

    pub fn secure_cooldown(&self) -> Duration {
        Duration::from_secs(self.secure_cooldown_secs)
    }

    pub fn secure_retry(&self) -> Duration {
        Duration::from_millis(self.secure_retry_ms)
    }

    pub fn pin_poll_interval(&self) -> Duration {
        Duration::from_secs(self.pin_poll_interval_secs.max(1))
    }
}
