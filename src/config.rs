//! Process configuration
//!
//! Loaded from `config/wordwarden.yaml` when present; every field has a
//! default. Secrets only come from the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE: &str = "config/wordwarden.yaml";
pub const TOKEN_VAR: &str = "DISCORD_TOKEN";
pub const CLIENT_ID_VAR: &str = "WORDWARDEN_CLIENT_ID";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("DISCORD_TOKEN must be set")]
    MissingToken,

    #[error("WORDWARDEN_CLIENT_ID is not a valid id: {0}")]
    InvalidClientId(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// User id attached to automated actions; the bot's own id when unset
    pub client_id: Option<u64>,
    pub worker_timeout_ms: u64,
    pub worker_threads: usize,
    pub worker_queue_depth: usize,
    pub dedupe_ttl_secs: u64,
    /// Lifetime of channel alerts
    pub alert_ttl_secs: u64,
    pub reversal_check_interval_secs: u64,
    pub lock_sweep_interval_secs: u64,
    pub settings_file: PathBuf,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            worker_timeout_ms: 500,
            worker_threads: std::thread::available_parallelism().map_or(1, usize::from),
            worker_queue_depth: 256,
            dedupe_ttl_secs: 20,
            alert_ttl_secs: 10,
            reversal_check_interval_secs: 30,
            lock_sweep_interval_secs: 60,
            settings_file: PathBuf::from("data/guilds.yaml"),
        }
    }
}

impl BotConfig {
    /// Load from `path`, falling back to defaults if the file does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match tokio::fs::read_to_string(path.as_ref()).await {
            Ok(contents) => Self::from_yaml(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// # Errors
    /// Returns an error if `yaml` is not a valid config.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// # Errors
    /// Returns an error if an override is malformed.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(raw) = lookup(CLIENT_ID_VAR).filter(|v| !v.trim().is_empty()) {
            let id = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|id| *id != 0)
                .ok_or(ConfigError::InvalidClientId(raw))?;
            self.client_id = Some(id);
        }
        Ok(self)
    }

    #[must_use]
    pub const fn worker_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_timeout_ms)
    }

    #[must_use]
    pub fn dedupe_ttl(&self) -> Duration {
        Duration::from_secs(self.dedupe_ttl_secs.max(1))
    }

    #[must_use]
    pub const fn alert_ttl(&self) -> Duration {
        Duration::from_secs(self.alert_ttl_secs)
    }

    #[must_use]
    pub fn reversal_check_interval(&self) -> Duration {
        Duration::from_secs(self.reversal_check_interval_secs.max(1))
    }

    #[must_use]
    pub fn lock_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.lock_sweep_interval_secs.max(1))
    }
}

/// Read the bot token through `lookup`.
///
/// # Errors
/// Returns [`ConfigError::MissingToken`] if it is unset or blank.
pub fn discord_token(lookup: impl Fn(&str) -> Option<String>) -> Result<String, ConfigError> {
    lookup(TOKEN_VAR)
        .filter(|token| !token.trim().is_empty())
        .ok_or(ConfigError::MissingToken)
}
