//! Derived temperature metrics tracked across samples.
//!
//! [`HistoryTracker`] keeps one [`EntityHistory`] per GPU index for the
//! lifetime of the monitor. Entries are created on first sighting and are
//! never dropped; a GPU missing from a snapshot keeps its last history as-is.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::hardware::snapshot::Snapshot;
use crate::types::{GpuIndex, Timestamp};

/// Lower bound on the elapsed time used as a rate denominator, in seconds.
const MIN_ELAPSED_SECS: f64 = 1e-3;

/// Per-GPU accumulator for values that need more than one sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityHistory {
    /// Highest temperature seen since first sighting or the last reset.
    pub peak_temperature: f64,
    pub previous_temperature: f64,
    pub previous_timestamp: Timestamp,
    /// Temperature rate of change in °C/second (signed).
    pub last_rate: f64,
}

impl EntityHistory {
    fn first_sighting(temperature: f64, at: Timestamp) -> Self {
        Self {
            peak_temperature: temperature,
            previous_temperature: temperature,
            previous_timestamp: at,
            last_rate: 0.0,
        }
    }

    fn observe(&mut self, temperature: f64, at: Timestamp) {
        self.peak_temperature = self.peak_temperature.max(temperature);

        // Clock skew or a replayed sample: keep the previous rate and pair.
        let Some(micros) = (at - self.previous_timestamp)
            .num_microseconds()
            .filter(|&m| m > 0)
        else {
            return;
        };

        let elapsed_secs = (micros as f64 / 1e6).max(MIN_ELAPSED_SECS);
        self.last_rate = (temperature - self.previous_temperature) / elapsed_secs;
        self.previous_temperature = temperature;
        self.previous_timestamp = at;
    }
}

/// Maintains [`EntityHistory`] for every GPU ever seen.
#[derive(Debug, Default)]
pub struct HistoryTracker {
    entries: BTreeMap<GpuIndex, EntityHistory>,
}

impl HistoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a new snapshot into the per-GPU history.
    pub fn update(&mut self, snapshot: &Snapshot) {
        for gpu in &snapshot.gpus {
            let temperature = gpu.temperature_celsius;
            if !temperature.is_finite() {
                continue;
            }
            self.entries
                .entry(gpu.gpu_index)
                .and_modify(|h| h.observe(temperature, snapshot.taken_at))
                .or_insert_with(|| EntityHistory::first_sighting(temperature, snapshot.taken_at));
        }
    }

    pub fn get(&self, gpu_index: GpuIndex) -> Option<&EntityHistory> {
        self.entries.get(&gpu_index)
    }

    /// Re-seed peak temperature to the last observed temperature.
    ///
    /// Applies to one GPU, or to all of them when `gpu_index` is `None`.
    /// Returns how many entries were reset.
    pub fn reset_peaks(&mut self, gpu_index: Option<GpuIndex>) -> usize {
        let mut reset = 0;
        for (index, history) in self.entries.iter_mut() {
            if gpu_index.map_or(true, |target| target == *index) {
                history.peak_temperature = history.previous_temperature;
                reset += 1;
            }
        }
        reset
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
