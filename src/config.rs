//! Add-in configuration.
//!
//! Resolution order: built-in defaults, then a JSON file, then environment
//! overrides, then whatever the CLI applies on top.
//!
//! CHANGELOG:
//! - 10/26/2026 - Bounds for timer intervals and message size
//! - 10/19/2026 - Runtime directory for socket queues
//! - 10/12/2026 - Initial implementation

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::channel::MAX_MESSAGE_LIMIT;

/// Prefix the host puts in front of add-in queue names.
pub const QUEUE_PREFIX: &str = "MQ$";

pub const CONFIG_ENV: &str = "ADDIN_SERVER_CONFIG";
pub const STORE_DIR_ENV: &str = "ADDIN_SERVER_STORE_DIR";
pub const RUNTIME_DIR_ENV: &str = "ADDIN_SERVER_RUNTIME_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Periodic housekeeping timers. An interval of 0 disables that timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub daily: bool,
    pub minutes: u64,
    pub seconds: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            daily: true,
            minutes: 3,
            seconds: 30,
        }
    }
}

impl TimerConfig {
    /// Interval of the minutes timer, `None` when disabled.
    pub fn minutes_interval(&self) -> Result<Option<chrono::Duration>, ConfigError> {
        checked_interval(self.minutes, 60, "timers.minutes")
    }

    /// Interval of the seconds timer, `None` when disabled.
    pub fn seconds_interval(&self) -> Result<Option<chrono::Duration>, ConfigError> {
        checked_interval(self.seconds, 1, "timers.seconds")
    }
}

fn checked_interval(
    count: u64,
    unit_secs: i64,
    field: &str,
) -> Result<Option<chrono::Duration>, ConfigError> {
    if count == 0 {
        return Ok(None);
    }
    i64::try_from(count)
        .ok()
        .and_then(|n| n.checked_mul(unit_secs))
        .and_then(chrono::Duration::try_seconds)
        .map(Some)
        .ok_or_else(|| ConfigError::Invalid(format!("{} is out of range: {}", field, count)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddinConfig {
    /// Task name used in console output and `Tell <name> ...` usage lines.
    pub program_name: String,
    /// Friendly name shown on the status line and in lifecycle notices.
    pub display_name: String,
    /// Queue name; derived from the program name when unset.
    pub queue_name: Option<String>,
    pub max_message_size: usize,
    pub receive_timeout_ms: u64,
    pub queue_capacity: usize,
    pub store_dir: Option<PathBuf>,
    pub runtime_dir: Option<PathBuf>,
    pub timers: TimerConfig,
}

impl Default for AddinConfig {
    fn default() -> Self {
        Self {
            program_name: "AddinServer".to_string(),
            display_name: "Addin Server".to_string(),
            queue_name: None,
            max_message_size: 256,
            receive_timeout_ms: 500,
            queue_capacity: 64,
            store_dir: None,
            runtime_dir: None,
            timers: TimerConfig::default(),
        }
    }
}

/// `~/.addin-server`
pub fn default_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".addin-server")
}

/// Default config file location.
pub fn default_config_path() -> PathBuf {
    default_home().join("config.json")
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).to_string())
}

impl AddinConfig {
    /// Load from an explicit file, `$ADDIN_SERVER_CONFIG`, or the default path
    /// if it exists, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::from_file(&expand(&path))?,
            None => {
                let default_path = default_config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(&mut self) {
        if let Some(dir) = std::env::var_os(STORE_DIR_ENV) {
            self.store_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = std::env::var_os(RUNTIME_DIR_ENV) {
            self.runtime_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.program_name.trim().is_empty() {
            return Err(ConfigError::Invalid("program_name must not be empty".into()));
        }
        if self.program_name.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid(
                "program_name must be a single word".into(),
            ));
        }
        if self.max_message_size == 0 || self.max_message_size > MAX_MESSAGE_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_message_size must be between 1 and {}",
                MAX_MESSAGE_LIMIT
            )));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be positive".into()));
        }
        self.timers.minutes_interval()?;
        self.timers.seconds_interval()?;
        Ok(())
    }

    pub fn queue_name(&self) -> String {
        match &self.queue_name {
            Some(name) => name.to_uppercase(),
            None => format!("{}{}", QUEUE_PREFIX, self.program_name.to_uppercase()),
        }
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn store_dir(&self) -> PathBuf {
        self.store_dir
            .as_deref()
            .map(expand)
            .unwrap_or_else(|| default_home().join("stores"))
    }

    pub fn runtime_dir(&self) -> PathBuf {
        self.runtime_dir
            .as_deref()
            .map(expand)
            .unwrap_or_else(|| default_home().join("run"))
    }
}
