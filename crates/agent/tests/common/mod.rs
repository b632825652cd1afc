#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use gpuwatch_agent::source::{AcquisitionError, SnapshotSource};
use gpuwatch_core::hardware::snapshot::{DriverInfo, GpuReading, Snapshot};
use gpuwatch_core::types::GpuIndex;

/// A GPU reading with quiet defaults and the given temperature.
pub fn reading(gpu_index: GpuIndex, temperature: f64) -> GpuReading {
    GpuReading {
        gpu_index,
        name: format!("Test GPU {gpu_index}"),
        memory_total_mb: 16384,
        power_limit_watts: 300.0,
        utilization_percent: 10.0,
        memory_used_mb: 1024,
        temperature_celsius: temperature,
        fan_speed_percent: Some(30.0),
        power_draw_watts: Some(60.0),
        compute_mode: "Default".to_string(),
    }
}

/// A snapshot of GPU 0 at the given temperature, `secs` seconds into the run.
pub fn temperature_snapshot(secs: i64, temperature: f64) -> Snapshot {
    snapshot_at(secs, vec![reading(0, temperature)])
}

pub fn snapshot_at(secs: i64, gpus: Vec<GpuReading>) -> Snapshot {
    Snapshot {
        taken_at: DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0)
            .expect("valid timestamp"),
        driver: DriverInfo {
            driver_version: "550.54.14".to_string(),
            cuda_version: Some("12.4".to_string()),
            process_count: 1,
        },
        gpus,
    }
}

/// One scripted answer.
pub enum Step {
    Snapshot(Snapshot),
    Fail(&'static str),
    /// Answer with the snapshot after sleeping.
    Slow(Duration, Snapshot),
}

/// A source that replays a script, then keeps answering with a quiet GPU.
///
/// Records when each fetch started and the peak number of concurrent fetches.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Step>>,
    started: Mutex<Vec<Instant>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            started: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    pub fn started_at(&self) -> Vec<Instant> {
        self.started.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSource {
    async fn fetch(&self) -> Result<Snapshot, AcquisitionError> {
        let call = {
            let mut started = self.started.lock().unwrap();
            started.push(Instant::now());
            started.len()
        };
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let step = self.script.lock().unwrap().pop_front();
        let result = match step {
            Some(Step::Snapshot(snapshot)) => Ok(snapshot),
            Some(Step::Fail(cause)) => Err(AcquisitionError::Unavailable(cause.to_string())),
            Some(Step::Slow(delay, snapshot)) => {
                tokio::time::sleep(delay).await;
                Ok(snapshot)
            }
            None => Ok(temperature_snapshot(call as i64, 40.0)),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
