//! Runtime configuration for the reward controller.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_BACKGROUND_CHECK_INTERVAL_SECS, DEFAULT_STEP_POLL_INTERVAL_SECS, DEFAULT_STORAGE_KEY,
    MAX_BACKGROUND_CHECK_INTERVAL_SECS, MAX_STEP_POLL_INTERVAL_SECS,
    MIN_BACKGROUND_CHECK_INTERVAL_SECS, MIN_STEP_POLL_INTERVAL_SECS,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardConfig {
    /// Blob-store key for the persisted reward state.
    #[serde(default = "RewardConfig::default_storage_key")]
    pub storage_key: String,
    /// Foreground step polling cadence.
    #[serde(default = "RewardConfig::default_step_poll_interval_secs")]
    pub step_poll_interval_secs: u64,
    /// Minimum spacing of background step checks.
    #[serde(default = "RewardConfig::default_background_check_interval_secs")]
    pub background_check_interval_secs: u64,
    #[serde(default = "RewardConfig::default_notifications_enabled")]
    pub notifications_enabled: bool,
}

impl RewardConfig {
    fn default_storage_key() -> String {
        DEFAULT_STORAGE_KEY.to_string()
    }

    const fn default_step_poll_interval_secs() -> u64 {
        DEFAULT_STEP_POLL_INTERVAL_SECS
    }

    const fn default_background_check_interval_secs() -> u64 {
        DEFAULT_BACKGROUND_CHECK_INTERVAL_SECS
    }

    const fn default_notifications_enabled() -> bool {
        true
    }

    /// Parse and validate a JSON config document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed JSON and the validation
    /// error for out-of-range values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when any field violates the documented bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_key.trim().is_empty() {
            return Err(ConfigError::EmptyStorageKey);
        }
        check_range(
            "step_poll_interval_secs",
            self.step_poll_interval_secs,
            MIN_STEP_POLL_INTERVAL_SECS,
            MAX_STEP_POLL_INTERVAL_SECS,
        )?;
        check_range(
            "background_check_interval_secs",
            self.background_check_interval_secs,
            MIN_BACKGROUND_CHECK_INTERVAL_SECS,
            MAX_BACKGROUND_CHECK_INTERVAL_SECS,
        )?;
        if self.background_check_interval_secs < self.step_poll_interval_secs {
            return Err(ConfigError::BackgroundFasterThanPoll {
                background: self.background_check_interval_secs,
                poll: self.step_poll_interval_secs,
            });
        }
        Ok(())
    }
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            storage_key: Self::default_storage_key(),
            step_poll_interval_secs: Self::default_step_poll_interval_secs(),
            background_check_interval_secs: Self::default_background_check_interval_secs(),
            notifications_enabled: Self::default_notifications_enabled(),
        }
    }
}

const fn check_range(
    field: &'static str,
    value: u64,
    min: u64,
    max: u64,
) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::RangeViolation {
            field,
            min,
            max,
            value,
        });
    }
    Ok(())
}

/// Errors raised when reward configuration invariants are violated.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("storage_key must not be empty")]
    EmptyStorageKey,
    #[error("{field} must be between {min} and {max} (got {value})")]
    RangeViolation {
        field: &'static str,
        min: u64,
        max: u64,
        value: u64,
    },
    #[error("background interval {background}s is shorter than poll interval {poll}s")]
    BackgroundFasterThanPoll { background: u64, poll: u64 },
}
