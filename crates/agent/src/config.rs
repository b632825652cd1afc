use gpuwatch_core::error::CoreError;
use gpuwatch_core::hardware::thresholds::ThresholdTable;
use gpuwatch_core::monitor_config::{MonitorConfig, DEFAULT_POLL_INTERVAL_MS};

/// Agent configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub monitor: MonitorConfig,
    /// Remote stats endpoint. When unset the agent reads NVML directly.
    pub source_url: Option<String>,
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var              | Default |
    /// |----------------------|---------|
    /// | `POLL_INTERVAL_MS`   | `1000`  |
    /// | `THRESHOLDS_FILE`    | unset   |
    /// | `METRICS_SOURCE_URL` | unset   |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let poll_interval_ms = match lookup("POLL_INTERVAL_MS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                CoreError::Configuration(format!(
                    "POLL_INTERVAL_MS must be a positive integer, got {raw:?}"
                ))
            })?,
            None => DEFAULT_POLL_INTERVAL_MS,
        };

        let threshold_table = lookup("THRESHOLDS_FILE")
            .map(|path| {
                let json = std::fs::read_to_string(&path).map_err(|e| {
                    CoreError::Configuration(format!("cannot read THRESHOLDS_FILE {path}: {e}"))
                })?;
                ThresholdTable::from_json(&json)
            })
            .transpose()?;

        let source_url = lookup("METRICS_SOURCE_URL")
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        let monitor = MonitorConfig {
            poll_interval_ms,
            threshold_table,
        };
        monitor.validate()?;

        Ok(Self {
            monitor,
            source_url,
        })
    }
}
