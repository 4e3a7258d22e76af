use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::common::env::{DATA_DIR_VAR, DEBOUNCE_VAR, TYPING_TTL_VAR, USER_VAR};
use crate::common::{EnvProvider, UserId};

pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const DEFAULT_DATA_DIR: &str = ".inpage-threads";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error("No user configured; set {var} or pass --user")]
    MissingUser { var: &'static str },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Viewer identity
    pub user: Option<UserId>,
    pub data_dir: PathBuf,
    pub typing_debounce_ms: u64,
    pub typing_ttl_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user: None,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            typing_debounce_ms: 500,
            typing_ttl_ms: 3000,
        }
    }
}

impl Settings {
    /// Defaults, then the YAML file, then the environment
    ///
    /// Without an explicit `config_path` the file is looked up as
    /// `<data_dir>/config.yaml` and skipped when absent.
    pub fn load(config_path: Option<&Path>, env: &impl EnvProvider) -> ConfigResult<Self> {
        let mut settings = Settings::default();
        if let Some(dir) = env.get_var(DATA_DIR_VAR) {
            settings.data_dir = PathBuf::from(dir);
        }

        let path = match config_path {
            Some(path) => Some(path.to_path_buf()),
            None => Some(settings.data_dir.join(CONFIG_FILE_NAME)).filter(|p| p.exists()),
        };
        if let Some(path) = path {
            settings = Self::from_file(&path)?;
        }

        settings.apply_env(env)?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded settings from {}", path.display());

        if content.trim().is_empty() {
            return Ok(Settings::default());
        }
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(&mut self, env: &impl EnvProvider) -> ConfigResult<()> {
        if let Some(user) = env.viewer() {
            // The file wins over the login-name fallback, not over the explicit variable
            if self.user.is_none() || env.get_var(USER_VAR).is_some() {
                self.user = Some(user);
            }
        }
        if let Some(dir) = env.get_var(DATA_DIR_VAR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(value) = env.get_var(DEBOUNCE_VAR) {
            self.typing_debounce_ms = parse_millis(DEBOUNCE_VAR, &value)?;
        }
        if let Some(value) = env.get_var(TYPING_TTL_VAR) {
            self.typing_ttl_ms = parse_millis(TYPING_TTL_VAR, &value)?;
        }
        Ok(())
    }

    /// Command line flags take precedence over everything else
    pub fn with_overrides(mut self, user: Option<UserId>, data_dir: Option<PathBuf>) -> Self {
        if let Some(user) = user {
            self.user = Some(user);
        }
        if let Some(data_dir) = data_dir {
            self.data_dir = data_dir;
        }
        self
    }

    pub fn viewer(&self) -> ConfigResult<&str> {
        self.user
            .as_deref()
            .filter(|user| !user.trim().is_empty())
            .ok_or(ConfigError::MissingUser { var: USER_VAR })
    }

    pub fn drafts_dir(&self) -> PathBuf {
        self.data_dir.join("drafts")
    }

    pub fn typing_debounce(&self) -> Duration {
        Duration::from_millis(self.typing_debounce_ms)
    }

    pub fn typing_ttl(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.typing_ttl_ms as i64)
    }
}

fn parse_millis(key: &str, value: &str) -> ConfigResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}
