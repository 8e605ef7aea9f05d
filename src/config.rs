//! Scheduler-wide configuration: a TOML file with environment-variable
//! overrides, loaded with a fallback to built-in defaults if the file is
//! absent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, reason: String },
    Parse { path: PathBuf, reason: String },
    InvalidPollingInterval { polling_interval_ms: u64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, reason } => {
                write!(f, "failed to read config file {}: {}", path.display(), reason)
            }
            ConfigError::Parse { path, reason } => {
                write!(f, "failed to parse config file {}: {}", path.display(), reason)
            }
            ConfigError::InvalidPollingInterval { polling_interval_ms } => write!(
                f,
                "polling_interval_ms ({}) must be <= 60000 and evenly divide 60000",
                polling_interval_ms
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// The handful of knobs this crate's scheduler needs: how often to poll, where
/// its durable state lives, and how far back to search for a task's most
/// recent scheduled fire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,
    #[serde(default = "default_state_db_path")]
    pub state_db_path: PathBuf,
    #[serde(default = "default_max_lookback_years")]
    pub max_lookback_years: u32,
}

fn default_polling_interval_ms() -> u64 {
    1_000
}

fn default_state_db_path() -> PathBuf {
    PathBuf::from("cronkeep-state.sqlite3")
}

fn default_max_lookback_years() -> u32 {
    4
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            polling_interval_ms: default_polling_interval_ms(),
            state_db_path: default_state_db_path(),
            max_lookback_years: default_max_lookback_years(),
        }
    }
}

impl SchedulerSettings {
    /// Reads a TOML file, falling back to defaults for any key it omits,
    /// then applies `CRONKEEP_*` environment overrides on top.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut settings = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            toml::from_str(&contents).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        } else {
            Self::default()
        };

        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CRONKEEP_POLLING_INTERVAL_MS") {
            if let Ok(parsed) = v.parse() {
                self.polling_interval_ms = parsed;
            }
        }
        if let Ok(v) = std::env::var("CRONKEEP_STATE_DB_PATH") {
            self.state_db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CRONKEEP_MAX_LOOKBACK_YEARS") {
            if let Ok(parsed) = v.parse() {
                self.max_lookback_years = parsed;
            }
        }
    }

    /// The polling interval must divide a minute evenly (and not exceed it)
    /// so the scheduler never skips the one-minute resolution a cron
    /// expression can express.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.polling_interval_ms == 0
            || self.polling_interval_ms > 60_000
            || 60_000 % self.polling_interval_ms != 0
        {
            return Err(ConfigError::InvalidPollingInterval {
                polling_interval_ms: self.polling_interval_ms,
            });
        }
        Ok(())
    }

    pub fn lookback_days(&self) -> i64 {
        i64::from(self.max_lookback_years) * 366
    }
}
