//! Per-cycle monitor pipeline and the consolidated view it publishes.
//!
//! [`MonitorState`] owns everything that must survive across cycles (last
//! known readings, derived history, alerts) and applies one sampling
//! outcome at a time. It holds no timer; the caller decides the cadence.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::alert::{Alert, AlertTransition};
use crate::error::CoreError;
use crate::hardware::alerts::{AlertLifecycle, Observation};
use crate::hardware::history::HistoryTracker;
use crate::hardware::snapshot::{DriverInfo, GpuReading, Snapshot};
use crate::hardware::thresholds::{MetricKind, SeverityTier, ThresholdTable};
use crate::types::{GpuIndex, Timestamp};

/// One classified metric for a GPU.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricView {
    pub metric: MetricKind,
    /// The value used for classification (uncapped).
    pub value: f64,
    /// The value for display: percentages capped to `0..=100`.
    pub display_value: f64,
    pub tier: SeverityTier,
}

/// A GPU with its last known raw reading, derived fields and severities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpuView {
    pub reading: GpuReading,
    /// False when the GPU was missing from the latest snapshot.
    pub present: bool,
    pub peak_temperature: f64,
    /// Temperature rate of change in °C/second.
    pub temperature_rate: f64,
    /// Classified metrics in evaluation order. Undefined metrics are omitted.
    pub metrics: Vec<MetricView>,
}

impl GpuView {
    pub fn tier(&self, metric: MetricKind) -> Option<SeverityTier> {
        self.metrics
            .iter()
            .find(|m| m.metric == metric)
            .map(|m| m.tier)
    }
}

/// Read-only consolidated state handed to consumers after every cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitorView {
    pub gpus: Vec<GpuView>,
    pub driver: Option<DriverInfo>,
    /// Open and resolved alerts, until dismissed.
    pub alerts: Vec<Alert>,
    pub last_success_at: Option<Timestamp>,
    pub last_error: Option<String>,
    /// Number of cycles applied, successful or not.
    pub cycle: u64,
}

impl MonitorView {
    pub fn gpu(&self, gpu_index: GpuIndex) -> Option<&GpuView> {
        self.gpus.iter().find(|g| g.reading.gpu_index == gpu_index)
    }

    pub fn open_alerts(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(|a| a.is_open())
    }
}

/// What a successful cycle did, for the caller to log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub gpu_count: usize,
    pub transitions: Vec<AlertTransition>,
    /// Metrics that could not be classified this cycle.
    pub undefined: Vec<CoreError>,
}

/// State carried across sampling cycles.
#[derive(Debug)]
pub struct MonitorState {
    thresholds: ThresholdTable,
    history: HistoryTracker,
    alerts: AlertLifecycle,
    readings: BTreeMap<GpuIndex, GpuReading>,
    metrics: BTreeMap<GpuIndex, Vec<MetricView>>,
    present: Vec<GpuIndex>,
    driver: Option<DriverInfo>,
    last_success_at: Option<Timestamp>,
    last_error: Option<String>,
    cycle: u64,
}

impl MonitorState {
    pub fn new(thresholds: ThresholdTable) -> Self {
        Self {
            thresholds,
            history: HistoryTracker::new(),
            alerts: AlertLifecycle::new(),
            readings: BTreeMap::new(),
            metrics: BTreeMap::new(),
            present: Vec::new(),
            driver: None,
            last_success_at: None,
            last_error: None,
            cycle: 0,
        }
    }

    /// Apply a successful snapshot: derive, classify, then run the alert
    /// lifecycle in ascending (GPU index, metric) order.
    ///
    /// A malformed snapshot is recorded as the last error and leaves all
    /// prior state untouched.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> Result<CycleReport, CoreError> {
        if let Err(e) = snapshot.validate() {
            self.record_failure(e.to_string());
            return Err(e);
        }

        self.cycle += 1;
        self.history.update(&snapshot);

        let mut report = CycleReport {
            gpu_count: snapshot.gpus.len(),
            ..Default::default()
        };

        for reading in snapshot.sorted_gpus() {
            let mut classified = Vec::with_capacity(MetricKind::ALL.len());
            for metric in MetricKind::ALL {
                let value = match metric.value_of(reading) {
                    Ok(value) => value,
                    Err(e) => {
                        report.undefined.push(e);
                        continue;
                    }
                };
                let tier = self.thresholds.classify(metric, value);
                classified.push(MetricView {
                    metric,
                    value,
                    display_value: metric.display_value(value),
                    tier,
                });

                let transition = self.alerts.observe(Observation {
                    gpu_index: reading.gpu_index,
                    metric,
                    value,
                    tier,
                    bounds: self.thresholds.bounds(metric),
                    at: snapshot.taken_at,
                });
                report.transitions.extend(transition);
            }
            self.metrics.insert(reading.gpu_index, classified);
        }

        self.present = snapshot.gpus.iter().map(|g| g.gpu_index).collect();
        for reading in snapshot.gpus {
            self.readings.insert(reading.gpu_index, reading);
        }
        self.driver = Some(snapshot.driver);
        self.last_success_at = Some(snapshot.taken_at);
        self.last_error = None;

        Ok(report)
    }

    /// Record a failed cycle. Everything but the error and cycle count is kept.
    pub fn record_failure(&mut self, cause: impl Into<String>) {
        self.cycle += 1;
        self.last_error = Some(cause.into());
    }

    /// Remove an alert by id. Returns whether anything was removed.
    pub fn dismiss(&mut self, id: &str) -> bool {
        self.alerts.dismiss(id).is_some()
    }

    /// Re-seed peak temperature for one GPU, or all when `None`.
    pub fn reset_peaks(&mut self, gpu_index: Option<GpuIndex>) -> usize {
        self.history.reset_peaks(gpu_index)
    }

    pub fn thresholds(&self) -> &ThresholdTable {
        &self.thresholds
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Build the consolidated view of every GPU ever seen.
    pub fn view(&self) -> MonitorView {
        let gpus = self
            .readings
            .values()
            .map(|reading| {
                let history = self.history.get(reading.gpu_index);
                GpuView {
                    reading: reading.clone(),
                    present: self.present.contains(&reading.gpu_index),
                    peak_temperature: history
                        .map_or(reading.temperature_celsius, |h| h.peak_temperature),
                    temperature_rate: history.map_or(0.0, |h| h.last_rate),
                    metrics: self
                        .metrics
                        .get(&reading.gpu_index)
                        .cloned()
                        .unwrap_or_default(),
                }
            })
            .collect();

        MonitorView {
            gpus,
            driver: self.driver.clone(),
            alerts: self.alerts.alerts().cloned().collect(),
            last_success_at: self.last_success_at,
            last_error: self.last_error.clone(),
            cycle: self.cycle,
        }
    }
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::new(ThresholdTable::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
