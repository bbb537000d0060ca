//! Configuration settings for fieldsync.
//!
//! Settings are loaded from `~/.fieldsync/config.yaml`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Paths;
use crate::error::FieldSyncError;
use crate::sync::{AlwaysRetry, ExponentialBackoff, RetryPolicy};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Drain settings.
    pub sync: SyncConfig,
    /// Retry and abandonment policy.
    pub retry: RetryConfig,
    /// Remote endpoint settings.
    pub remote: RemoteConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Drain and status polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum items pulled from the queue per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Timeout for a single remote apply call, in seconds.
    #[serde(default = "default_apply_timeout")]
    pub apply_timeout_secs: u64,
    /// Status reporter polling interval, in seconds.
    #[serde(default = "default_status_poll")]
    pub status_poll_secs: u64,
}

/// Which retry policy to use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Attempt every open item on every drain.
    #[default]
    Always,
    /// Exponential backoff with optional abandonment.
    Backoff,
}

/// Retry and abandonment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Policy selection.
    pub policy: PolicyKind,
    /// Backoff base delay in seconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,
    /// Backoff delay cap in seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
    /// Failed attempts after which an item is moved to the dead-letter view.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

/// Remote endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the sync endpoint.
    pub endpoint: Option<String>,
    /// Bearer token sent with every request.
    pub auth_token: Option<String>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

const fn default_batch_size() -> usize {
    25
}

const fn default_apply_timeout() -> u64 {
    30
}

const fn default_status_poll() -> u64 {
    5
}

const fn default_base_delay() -> u64 {
    5
}

const fn default_max_delay() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            apply_timeout_secs: default_apply_timeout(),
            status_poll_secs: default_status_poll(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::Always,
            base_delay_secs: default_base_delay(),
            max_delay_secs: default_max_delay(),
            max_attempts: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl SyncConfig {
    /// Remote apply timeout as a [`Duration`].
    #[must_use]
    pub const fn apply_timeout(&self) -> Duration {
        Duration::from_secs(self.apply_timeout_secs)
    }

    /// Status polling interval as a [`Duration`].
    #[must_use]
    pub const fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_secs)
    }
}

impl RetryConfig {
    /// Build the configured retry policy.
    #[must_use]
    pub fn build_policy(&self) -> Box<dyn RetryPolicy> {
        match self.policy {
            PolicyKind::Always => Box::new(AlwaysRetry),
            PolicyKind::Backoff => Box::new(ExponentialBackoff {
                base: seconds(self.base_delay_secs),
                max_delay: seconds(self.max_delay_secs),
                max_attempts: self.max_attempts,
            }),
        }
    }
}

fn seconds(secs: u64) -> chrono::Duration {
    let capped = i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000);
    chrono::Duration::seconds(capped)
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self, FieldSyncError> {
        let paths = Paths::new()?;
        Self::load_from_path(&paths.config_file)
    }

    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, FieldSyncError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            FieldSyncError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        serde_yaml::from_str(&contents).map_err(|e| {
            FieldSyncError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to_path(&self, path: &std::path::Path) -> Result<(), FieldSyncError> {
        let contents = serde_yaml::to_string(self)
            .map_err(|e| FieldSyncError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, contents).map_err(|e| {
            FieldSyncError::Config(format!(
                "Failed to write config file {}: {e}",
                path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.sync.batch_size, 25);
        assert_eq!(config.sync.apply_timeout(), Duration::from_secs(30));
        assert_eq!(config.retry.policy, PolicyKind::Always);
        assert_eq!(config.retry.max_attempts, None);
        assert!(config.remote.endpoint.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_missing_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let config = Config::load_from_path(&config_path).unwrap();
        assert_eq!(config.sync.batch_size, 25);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut config = Config::default();
        config.sync.batch_size = 10;
        config.remote.endpoint = Some("https://ops.example.com".to_string());

        config.save_to_path(&config_path).unwrap();
        let loaded = Config::load_from_path(&config_path).unwrap();

        assert_eq!(loaded.sync.batch_size, 10);
        assert_eq!(loaded.remote.endpoint.as_deref(), Some("https://ops.example.com"));
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let partial_yaml = r"
retry:
  policy: backoff
  max_attempts: 4
";
        std::fs::write(&config_path, partial_yaml).unwrap();

        let config = Config::load_from_path(&config_path).unwrap();

        assert_eq!(config.retry.policy, PolicyKind::Backoff);
        assert_eq!(config.retry.max_attempts, Some(4));
        assert_eq!(config.retry.base_delay_secs, 5);
        assert_eq!(config.sync.apply_timeout_secs, 30);
    }

    #[test]
    fn test_large_backoff_delays_do_not_panic() {
        use crate::records::EntityKind;
        use crate::sync::{RetryDecision, SyncAction, SyncQueueItem};

        let yaml = r"
retry:
  policy: backoff
  base_delay_secs: 1000000000000000
  max_delay_secs: 1000000000000000
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let policy = config.retry.build_policy();

        let failed_at = chrono::Utc::now();
        let item = SyncQueueItem {
            retry_count: 1,
            last_attempt_at: Some(failed_at),
            ..SyncQueueItem::new("q1", EntityKind::Fuel, "f1", SyncAction::Update, b"{}".to_vec())
        };

        assert!(matches!(policy.decide(&item, failed_at), RetryDecision::Wait(_)));
    }

    #[test]
    fn test_invalid_config_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "sync: [not, a, map]").unwrap();

        let err = Config::load_from_path(&config_path).unwrap_err();
        assert!(matches!(err, FieldSyncError::Config(_)));
    }
}
