use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::backoff::BackoffConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment error: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// What happens to local state when a remote mutation fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPolicy {
    /// Keep the optimistic state
    #[default]
    Retain,
    /// Restore the pre-mutation snapshot
    Restore,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Feed configuration, read from `FEED_*` environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_retry_initial_backoff_ms")]
    pub retry_initial_backoff_ms: u64,
    #[serde(default = "default_retry_max_backoff_ms")]
    pub retry_max_backoff_ms: u64,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: f64,
    #[serde(default = "default_true")]
    pub retry_jitter: bool,
    #[serde(default)]
    pub rollback_policy: RollbackPolicy,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Credentials normally owned by the session store, read from `FEED_SESSION_*`
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub token: String,
    pub user_id: String,
}

impl FeedConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: FeedConfig = envy::prefixed("FEED_").from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults for one channel
    pub fn for_channel(channel_id: impl Into<String>) -> Self {
        Self {
            api_base_url: default_api_base_url(),
            channel_id: channel_id.into(),
            page_size: default_page_size(),
            request_timeout_ms: default_request_timeout_ms(),
            retry_initial_backoff_ms: default_retry_initial_backoff_ms(),
            retry_max_backoff_ms: default_retry_max_backoff_ms(),
            retry_backoff_multiplier: default_retry_backoff_multiplier(),
            retry_jitter: true,
            rollback_policy: RollbackPolicy::default(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_id.trim().is_empty() {
            return Err(ConfigError::Invalid("channel_id must be set".to_string()));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".to_string()));
        }
        if self.retry_backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "retry_backoff_multiplier must be >= 1.0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_backoff: Duration::from_millis(self.retry_initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry_max_backoff_ms),
            backoff_multiplier: self.retry_backoff_multiplier,
            jitter: self.retry_jitter,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(envy::prefixed("FEED_SESSION_").from_env()?)
    }
}

fn default_api_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_page_size() -> u32 {
    12
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_retry_initial_backoff_ms() -> u64 {
    500
}

fn default_retry_max_backoff_ms() -> u64 {
    30_000
}

fn default_retry_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}
