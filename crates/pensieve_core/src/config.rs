//! Runtime configuration for the core store.
//!
//! # Responsibility
//! - Describe where the database lives, how logging is set up and how long a
//!   call may wait on a locked database.
//! - Load that description from a JSON file.
//!
//! # Invariants
//! - Every field has a default, so a partial file is valid input.
//! - `validate()` must pass before a config is used to open a database.

use crate::db::OpenOptions;
use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_DB_FILE_NAME: &str = "pensieve.sqlite3";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 10_000;

/// Core runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// SQLite database file.
    pub db_path: PathBuf,
    /// One of `trace|debug|info|warn|error`.
    pub log_level: String,
    /// Absolute directory for rolling log files; `None` disables file logging.
    pub log_dir: Option<PathBuf>,
    /// Upper bound on waiting for a competing writer, in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_FILE_NAME),
            log_level: default_log_level().to_string(),
            log_dir: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Configuration load or validation failure.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "cannot parse config `{}`: {source}", path.display())
            }
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}

impl CoreConfig {
    /// Reads and validates a JSON config file. Missing keys take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("db_path cannot be empty".to_string()));
        }
        if self.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Invalid("log_level cannot be empty".to_string()));
        }
        if let Some(log_dir) = &self.log_dir {
            if !log_dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "log_dir must be an absolute path, got `{}`",
                    log_dir.display()
                )));
            }
        }
        Ok(())
    }

    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig};
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn defaults_are_valid() {
        let config = CoreConfig::default();
        config.validate().expect("defaults should validate");
        assert_eq!(config.open_options().busy_timeout, Duration::from_secs(10));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = CoreConfig {
            busy_timeout_ms: 0,
            ..CoreConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn relative_log_dir_is_rejected() {
        let config = CoreConfig {
            log_dir: Some(PathBuf::from("logs")),
            ..CoreConfig::default()
        };
        let err = config.validate().expect_err("relative log dir must fail");
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"db_path": "/tmp/custom.sqlite3", "busy_timeout_ms": 250}}"#)
            .expect("write config");

        let config = CoreConfig::from_json_file(file.path()).expect("config should load");
        assert_eq!(config.db_path, PathBuf::from("/tmp/custom.sqlite3"));
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.log_level, CoreConfig::default().log_level);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "not json").expect("write config");

        let err = CoreConfig::from_json_file(file.path()).expect_err("must fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
