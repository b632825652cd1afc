//! NVML-backed snapshot source.
//!
//! [`NvmlSource`] wraps the NVIDIA Management Library and reads every
//! visible device once per [`fetch`](SnapshotSource::fetch).
//!
//! NVML initialisation is **gracefully optional**: on a host without NVIDIA
//! drivers the source is still constructed, and every fetch fails with
//! [`AcquisitionError::Unavailable`] so the engine keeps running and surfaces
//! the cause as its last error.

use async_trait::async_trait;
use chrono::Utc;
use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
use nvml_wrapper::error::NvmlError;
use nvml_wrapper::Nvml;

use gpuwatch_core::hardware::snapshot::{DriverInfo, GpuReading, Snapshot};

use crate::source::{AcquisitionError, SnapshotSource};

const BYTES_PER_MB: u64 = 1024 * 1024;
const MILLIWATTS_PER_WATT: f64 = 1000.0;

pub struct NvmlSource {
    /// The initialisation failure is kept as text and reported on each poll.
    nvml: Result<Nvml, String>,
}

impl Default for NvmlSource {
    fn default() -> Self {
        Self::new()
    }
}

impl NvmlSource {
    /// Attempt to initialise NVML. Never fails; see the module docs.
    pub fn new() -> Self {
        let nvml = match Nvml::init() {
            Ok(nvml) => {
                tracing::info!("NVML initialised successfully");
                Ok(nvml)
            }
            Err(e) => {
                tracing::warn!(error = %e, "NVML unavailable -- every poll will report the cause");
                Err(e.to_string())
            }
        };
        Self { nvml }
    }

    pub fn is_available(&self) -> bool {
        self.nvml.is_ok()
    }

    /// Number of GPUs visible to NVML, or 0 if NVML is unavailable.
    pub fn gpu_count(&self) -> u32 {
        self.nvml
            .as_ref()
            .ok()
            .and_then(|nvml| nvml.device_count().ok())
            .unwrap_or(0)
    }

    /// Read every device. Devices that fail to answer are logged and skipped.
    fn collect(&self) -> Result<Snapshot, AcquisitionError> {
        let nvml = self
            .nvml
            .as_ref()
            .map_err(|cause| AcquisitionError::Unavailable(cause.clone()))?;

        let device_count = nvml
            .device_count()
            .map_err(|e| AcquisitionError::Unavailable(format!("device count query failed: {e}")))?;

        let taken_at = Utc::now();
        let mut gpus = Vec::with_capacity(device_count as usize);
        let mut process_count = 0u32;

        for idx in 0..device_count {
            match read_device(nvml, idx) {
                Ok((reading, processes)) => {
                    gpus.push(reading);
                    process_count += processes;
                }
                Err(e) => {
                    tracing::warn!(gpu_index = idx, error = %e, "Skipping GPU -- device query failed");
                }
            }
        }

        Ok(Snapshot {
            taken_at,
            driver: read_driver(nvml, process_count),
            gpus,
        })
    }
}

#[async_trait]
impl SnapshotSource for NvmlSource {
    async fn fetch(&self) -> Result<Snapshot, AcquisitionError> {
        self.collect()
    }
}

/// Read one device, returning its reading and running compute process count.
fn read_device(nvml: &Nvml, idx: u32) -> Result<(GpuReading, u32), NvmlError> {
    let device = nvml.device_by_index(idx)?;

    let name = device.name()?;
    let mem_info = device.memory_info()?;
    let temperature = device.temperature(TemperatureSensor::Gpu)?;
    let utilization = device.utilization_rates()?;

    // Passively cooled cards have no fan; some boards hide power telemetry.
    let fan_speed_percent = device.fan_speed(0).ok().map(f64::from);
    let power_draw_watts = device
        .power_usage()
        .ok()
        .map(|mw| f64::from(mw) / MILLIWATTS_PER_WATT);
    let power_limit_watts = device
        .enforced_power_limit()
        .map(|mw| f64::from(mw) / MILLIWATTS_PER_WATT)
        .unwrap_or(0.0);
    let compute_mode = device
        .compute_mode()
        .map(|mode| format!("{mode:?}"))
        .unwrap_or_default();
    let processes = device
        .running_compute_processes()
        .map(|p| p.len() as u32)
        .unwrap_or(0);

    let reading = GpuReading {
        gpu_index: idx,
        name,
        memory_total_mb: mem_info.total / BYTES_PER_MB,
        power_limit_watts,
        utilization_percent: f64::from(utilization.gpu),
        memory_used_mb: mem_info.used / BYTES_PER_MB,
        temperature_celsius: f64::from(temperature),
        fan_speed_percent,
        power_draw_watts,
        compute_mode,
    };
    Ok((reading, processes))
}

fn read_driver(nvml: &Nvml, process_count: u32) -> DriverInfo {
    let driver_version = nvml.sys_driver_version().unwrap_or_else(|e| {
        tracing::debug!(error = %e, "Driver version unavailable");
        String::new()
    });
    let cuda_version = nvml.sys_cuda_driver_version().ok().map(format_cuda_version);

    DriverInfo {
        driver_version,
        cuda_version,
        process_count,
    }
}

/// NVML encodes the CUDA driver version as `major * 1000 + minor * 10`.
pub fn format_cuda_version(raw: i32) -> String {
    format!("{}.{}", raw / 1000, (raw % 1000) / 10)
}
