use crate::types::GpuIndex;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    /// Rejected before the engine starts; never applied to a running table.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The metric cannot be computed for this cycle (e.g. zero capacity).
    #[error("Metric {metric} is undefined for GPU {gpu_index}")]
    UndefinedMetric {
        gpu_index: GpuIndex,
        metric: &'static str,
    },

    /// Treated as an acquisition failure for the cycle.
    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),
}
