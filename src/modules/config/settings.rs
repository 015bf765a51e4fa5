use chrono::Duration;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::modules::delivery::SmtpSettings;
use crate::{MAX_PIN_TTL_MINUTES, PIN_TTL_MINUTES, RECORDS_DIR, RECORD_BASE_NAME, USERS_FILE};

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Runtime settings, read from a JSON file
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub users_file: PathBuf,
    pub record_base_name: String,
    pub pin_ttl_minutes: i64,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub smtp: Option<SmtpSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(RECORDS_DIR),
            users_file: PathBuf::from(USERS_FILE),
            record_base_name: RECORD_BASE_NAME.to_string(),
            pin_ttl_minutes: PIN_TTL_MINUTES,
            log_level: "info".to_string(),
            log_file: None,
            smtp: None,
        }
    }
}

impl Settings {
    /// Load settings from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = match fs::read(path) {
            Ok(data) => serde_json::from_slice(&data).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No config file at {}, using defaults", path.display());
                Settings::default()
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.record_base_name.is_empty() {
            return Err(ConfigError::Invalid(
                "record_base_name must not be empty".to_string(),
            ));
        }
        if self.record_base_name.contains(['/', '\\', '.']) {
            return Err(ConfigError::Invalid(format!(
                "record_base_name {:?} must be a plain file name prefix",
                self.record_base_name
            )));
        }
        if self.pin_ttl_minutes <= 0 || self.pin_ttl_minutes > MAX_PIN_TTL_MINUTES {
            return Err(ConfigError::Invalid(format!(
                "pin_ttl_minutes must be between 1 and {}",
                MAX_PIN_TTL_MINUTES
            )));
        }
        Ok(())
    }

    pub fn pin_ttl(&self) -> Duration {
        Duration::minutes(self.pin_ttl_minutes)
    }
}
