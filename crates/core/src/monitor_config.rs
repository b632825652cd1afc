//! Monitor configuration recognised by the engine.
//!
//! Validated once, before an engine is built. A rejected configuration never
//! reaches a running classifier.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hardware::thresholds::ThresholdTable;

/// Default sampler cadence.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Sampler cadence in milliseconds. Must be non-zero.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Optional override of the default per-metric tier bounds.
    #[serde(default)]
    pub threshold_table: Option<ThresholdTable>,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            threshold_table: None,
        }
    }
}

impl MonitorConfig {
    /// Reject a zero interval. Threshold tables are validated when built.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_poll_interval_ms(self.poll_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// The configured table, or the defaults.
    pub fn thresholds(&self) -> ThresholdTable {
        self.threshold_table.clone().unwrap_or_default()
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CoreError::Configuration(format!("invalid monitor config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

pub fn validate_poll_interval_ms(ms: u64) -> Result<(), CoreError> {
    if ms == 0 {
        return Err(CoreError::Configuration(
            "poll_interval_ms must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
