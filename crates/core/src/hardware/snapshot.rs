//! Raw readings produced by one sampling cycle.
//!
//! A [`Snapshot`] is immutable once built and is superseded, never mutated,
//! by the next one.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{GpuIndex, Timestamp};

/// Per-GPU readings for a single cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuReading {
    pub gpu_index: GpuIndex,
    pub name: String,
    pub memory_total_mb: u64,
    pub power_limit_watts: f64,
    pub utilization_percent: f64,
    pub memory_used_mb: u64,
    pub temperature_celsius: f64,
    /// Not all GPUs expose fan speed (e.g. passively-cooled cards).
    pub fan_speed_percent: Option<f64>,
    /// Not all GPUs report power draw.
    pub power_draw_watts: Option<f64>,
    pub compute_mode: String,
}

/// Driver-level metadata reported alongside the device readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverInfo {
    pub driver_version: String,
    pub cuda_version: Option<String>,
    /// Number of processes currently holding a GPU context.
    pub process_count: u32,
}

/// One sampling cycle's complete reading set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at: Timestamp,
    pub driver: DriverInfo,
    pub gpus: Vec<GpuReading>,
}

impl Snapshot {
    /// Reject snapshots that report the same GPU index more than once.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut seen = HashSet::with_capacity(self.gpus.len());
        for gpu in &self.gpus {
            if !seen.insert(gpu.gpu_index) {
                return Err(CoreError::MalformedSnapshot(format!(
                    "GPU index {} reported more than once",
                    gpu.gpu_index
                )));
            }
        }
        Ok(())
    }

    /// Readings sorted by ascending GPU index.
    pub fn sorted_gpus(&self) -> Vec<&GpuReading> {
        let mut gpus: Vec<&GpuReading> = self.gpus.iter().collect();
        gpus.sort_by_key(|g| g.gpu_index);
        gpus
    }
}
