//! Hardware metric alert types for threshold excursions.

use std::fmt;

use serde::Serialize;

use crate::hardware::thresholds::{MetricKind, SeverityTier};
use crate::types::{GpuIndex, Timestamp};

/// Deterministic alert identity derived from GPU index and metric name.
///
/// The same (GPU, metric) pair always maps to the same id, so repeated
/// evaluation of the same excursion never produces a new id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct AlertId(String);

impl AlertId {
    pub fn new(gpu_index: GpuIndex, metric: MetricKind) -> Self {
        Self(format!("gpu{gpu_index}:{}", metric.name()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Severity carried by an alert record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Value reached the warning threshold but not the critical threshold.
    Warning,
    /// Value reached the critical threshold.
    Critical,
    /// Value dropped back below the warning threshold.
    Resolved,
}

impl AlertSeverity {
    /// The open-alert severity for a tier, or `None` if the tier does not alert.
    pub fn from_tier(tier: SeverityTier) -> Option<Self> {
        match tier {
            SeverityTier::Critical => Some(AlertSeverity::Critical),
            SeverityTier::Warning => Some(AlertSeverity::Warning),
            _ => None,
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
            AlertSeverity::Resolved => "resolved",
        };
        f.write_str(s)
    }
}

/// One open or resolved threshold excursion for a GPU metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: AlertId,
    /// GPU index (0-based).
    pub gpu_index: GpuIndex,
    pub metric: MetricKind,
    pub severity: AlertSeverity,
    /// The observed metric value that opened or last refreshed the alert.
    pub current_value: f64,
    /// The lower bound of the tier that was crossed.
    pub threshold_value: f64,
    pub message: String,
    /// When the excursion began. Unchanged while the alert stays open.
    pub opened_at: Timestamp,
    /// When value, severity or threshold last changed.
    pub updated_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
}

impl Alert {
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

/// What happened to an alert during one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// A new alert was created, or a resolved one re-opened.
    Opened,
    /// An open alert moved between warning and critical.
    SeverityChanged,
    /// An open alert's value or threshold changed at the same severity.
    Refreshed,
    Resolved,
}

/// A lifecycle transition reported back to the caller for logging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertTransition {
    pub id: AlertId,
    pub kind: TransitionKind,
    pub severity: AlertSeverity,
    pub value: f64,
}
