use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::utils::{CircuitBreakerConfig, RetryConfig};

// ============================================================================
// Engine Configuration
// ============================================================================
//
// Every field has a default, so an empty JSON object is a valid config.
// The binary reads the file named by POS_FULFILLMENT_CONFIG when set.
//
// ============================================================================

pub const CONFIG_ENV: &str = "POS_FULFILLMENT_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ledger: LedgerConfig,
    pub notifications: NotificationConfig,
}

/// Stock ledger locking and retry budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_jitter_ms: u64,
    /// How long one attempt waits for the ingredient row lock
    pub lock_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 100,
            max_jitter_ms: 100,
            lock_timeout_ms: 250,
        }
    }
}

impl LedgerConfig {
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub channel_capacity: usize,
    pub failure_threshold: u32,
    pub open_cooldown_ms: u64,
    pub success_threshold: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            failure_threshold: 5,
            open_cooldown_ms: 30_000,
            success_threshold: 2,
        }
    }
}

impl NotificationConfig {
    pub fn breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            cooldown: Duration::from_millis(self.open_cooldown_ms),
            success_threshold: self.success_threshold,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("invalid engine config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("in config file {}", path.display()))
    }

    /// Load from the file named by [`CONFIG_ENV`], or fall back to defaults
    pub fn load() -> Result<Self> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(path),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ledger.max_attempts == 0 {
            bail!("ledger.max_attempts must be at least 1");
        }
        if self.notifications.channel_capacity == 0 {
            bail!("notifications.channel_capacity must be at least 1");
        }
        Ok(())
    }
}
