//! Acquisition collaborators.
//!
//! A [`SnapshotSource`] returns one [`Snapshot`] per call, or an
//! [`AcquisitionError`] whose `Display` output is the cause surfaced to
//! consumers. The sampler never calls a source concurrently with itself.
//!
//! [`HttpSource`] polls a remote stats endpoint; the NVML-backed source
//! lives in [`crate::collector`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use gpuwatch_core::hardware::snapshot::{DriverInfo, GpuReading, Snapshot};
use gpuwatch_core::types::{GpuIndex, Timestamp};

/// Request timeout for remote stats endpoints.
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors produced by an acquisition collaborator.
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    /// The source cannot be queried at all (no driver, no library).
    #[error("Metrics source unavailable: {0}")]
    Unavailable(String),

    /// The source answered but reported that the reading failed.
    #[error("Metrics source reported failure: {0}")]
    Unsuccessful(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed metrics payload: {0}")]
    Malformed(String),
}

/// Produces one snapshot of every GPU per call.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<Snapshot, AcquisitionError>;
}

// ---------------------------------------------------------------------------
// HTTP source
// ---------------------------------------------------------------------------

/// Incoming stats document from a remote GPU stats endpoint.
#[derive(Debug, Deserialize)]
pub struct StatsPayload {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub gpus: Vec<GpuPayload>,
    #[serde(default)]
    pub nvidia_info: Option<NvidiaInfoPayload>,
    #[serde(default)]
    pub processes: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct GpuPayload {
    pub index: GpuIndex,
    pub name: String,
    #[serde(default)]
    pub fan_speed: Option<f64>,
    #[serde(default)]
    pub power_draw: Option<f64>,
    pub power_limit: f64,
    pub memory_total: u64,
    pub memory_used: u64,
    pub gpu_utilization: f64,
    pub temperature: f64,
    #[serde(default)]
    pub compute_mode: String,
}

#[derive(Debug, Deserialize)]
pub struct NvidiaInfoPayload {
    pub driver_version: String,
    #[serde(default)]
    pub cuda_version: Option<String>,
}

impl StatsPayload {
    /// Convert into a snapshot stamped `taken_at`.
    ///
    /// `success == false` is a semantically unsuccessful result even when the
    /// transport succeeded.
    pub fn into_snapshot(self, taken_at: Timestamp) -> Result<Snapshot, AcquisitionError> {
        if !self.success {
            return Err(AcquisitionError::Unsuccessful(
                self.error
                    .unwrap_or_else(|| "stats endpoint returned success=false".to_string()),
            ));
        }

        let process_count = self.processes.len() as u32;
        let driver = match self.nvidia_info {
            Some(info) => DriverInfo {
                driver_version: info.driver_version,
                cuda_version: info.cuda_version,
                process_count,
            },
            None => DriverInfo {
                process_count,
                ..Default::default()
            },
        };

        let gpus = self
            .gpus
            .into_iter()
            .map(|gpu| GpuReading {
                gpu_index: gpu.index,
                name: gpu.name,
                memory_total_mb: gpu.memory_total,
                power_limit_watts: gpu.power_limit,
                utilization_percent: gpu.gpu_utilization,
                memory_used_mb: gpu.memory_used,
                temperature_celsius: gpu.temperature,
                fan_speed_percent: gpu.fan_speed,
                power_draw_watts: gpu.power_draw,
                compute_mode: gpu.compute_mode,
            })
            .collect();

        Ok(Snapshot {
            taken_at,
            driver,
            gpus,
        })
    }
}

/// Polls a remote endpoint that serves a [`StatsPayload`] as JSON.
pub struct HttpSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Result<Self, AcquisitionError> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SnapshotSource for HttpSource {
    async fn fetch(&self) -> Result<Snapshot, AcquisitionError> {
        let response = self.client.get(&self.url).send().await?.error_for_status()?;
        let taken_at = Utc::now();
        let payload: StatsPayload = response
            .json()
            .await
            .map_err(|e| AcquisitionError::Malformed(e.to_string()))?;
        payload.into_snapshot(taken_at)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
