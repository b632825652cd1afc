//! Severity classification for GPU metrics.
//!
//! Pure logic -- thresholds are data held in a [`ThresholdTable`], so they
//! can be overridden from configuration. Every table is validated on
//! construction (including deserialization), which means a running
//! classifier can never hold a non-monotonic or incomplete table.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hardware::snapshot::GpuReading;
use crate::metric_names::{
    METRIC_FAN_SPEED, METRIC_POWER_DRAW_PERCENT, METRIC_TEMPERATURE, METRIC_UTILIZATION,
    METRIC_VRAM_USED_PERCENT,
};
use crate::threshold_validation::validate_ascending_bounds;

// ---------------------------------------------------------------------------
// Severity tiers
// ---------------------------------------------------------------------------

/// Ordered classification of a metric value: `Ideal < Good < Caution < Warning < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityTier {
    Ideal,
    Good,
    Caution,
    Warning,
    Critical,
}

impl SeverityTier {
    /// All tiers in ascending order.
    pub const ALL: [SeverityTier; 5] = [
        SeverityTier::Ideal,
        SeverityTier::Good,
        SeverityTier::Caution,
        SeverityTier::Warning,
        SeverityTier::Critical,
    ];

    /// Whether a value in this tier should hold an alert open.
    pub fn is_alerting(self) -> bool {
        self >= SeverityTier::Warning
    }
}

// ---------------------------------------------------------------------------
// Metric kinds
// ---------------------------------------------------------------------------

/// The metrics classified for every GPU.
///
/// Declaration order is the fixed evaluation order within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    #[serde(rename = "utilization_percent")]
    Utilization,
    #[serde(rename = "vram_used_percent")]
    VramUsedPercent,
    #[serde(rename = "temperature_celsius")]
    Temperature,
    #[serde(rename = "fan_speed_percent")]
    FanSpeed,
    #[serde(rename = "power_draw_percent")]
    PowerDrawPercent,
}

impl MetricKind {
    /// All metric kinds in evaluation order.
    pub const ALL: [MetricKind; 5] = [
        MetricKind::Utilization,
        MetricKind::VramUsedPercent,
        MetricKind::Temperature,
        MetricKind::FanSpeed,
        MetricKind::PowerDrawPercent,
    ];

    /// Canonical metric name (see [`crate::metric_names`]).
    pub fn name(self) -> &'static str {
        match self {
            MetricKind::Utilization => METRIC_UTILIZATION,
            MetricKind::VramUsedPercent => METRIC_VRAM_USED_PERCENT,
            MetricKind::Temperature => METRIC_TEMPERATURE,
            MetricKind::FanSpeed => METRIC_FAN_SPEED,
            MetricKind::PowerDrawPercent => METRIC_POWER_DRAW_PERCENT,
        }
    }

    /// Whether the metric is a percentage (and is capped at 100 for display).
    pub fn is_percentage(self) -> bool {
        !matches!(self, MetricKind::Temperature)
    }

    /// Extract or compute this metric's value from a reading.
    ///
    /// Computed percentages are not capped: a momentarily inconsistent
    /// reading above 100% still classifies as Critical. Division by a zero
    /// capacity, a missing optional reading, or a non-finite result yields
    /// `CoreError::UndefinedMetric`.
    pub fn value_of(self, reading: &GpuReading) -> Result<f64, CoreError> {
        let value = match self {
            MetricKind::Utilization => Some(reading.utilization_percent),
            MetricKind::VramUsedPercent => (reading.memory_total_mb > 0).then(|| {
                reading.memory_used_mb as f64 / reading.memory_total_mb as f64 * 100.0
            }),
            MetricKind::Temperature => Some(reading.temperature_celsius),
            MetricKind::FanSpeed => reading.fan_speed_percent,
            MetricKind::PowerDrawPercent => reading
                .power_draw_watts
                .filter(|_| reading.power_limit_watts > 0.0)
                .map(|draw| draw / reading.power_limit_watts * 100.0),
        };

        value
            .filter(|v| v.is_finite())
            .ok_or(CoreError::UndefinedMetric {
                gpu_index: reading.gpu_index,
                metric: self.name(),
            })
    }

    /// The value shown to a display layer: percentages capped to `0..=100`.
    pub fn display_value(self, value: f64) -> f64 {
        if self.is_percentage() {
            value.clamp(0.0, 100.0)
        } else {
            value
        }
    }

    fn position(self) -> usize {
        self as usize
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Tier bounds
// ---------------------------------------------------------------------------

/// Lower bounds of the Good, Caution, Warning and Critical tiers for one metric.
///
/// Anything below the first bound is Ideal. With `lower_inclusive` a value
/// equal to a bound belongs to the higher tier (`[50, 60)`); without it the
/// value stays in the lower tier (`(35, 50]`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierBounds {
    pub bounds: [f64; 4],
    #[serde(default = "default_lower_inclusive")]
    pub lower_inclusive: bool,
}

fn default_lower_inclusive() -> bool {
    true
}

impl TierBounds {
    pub const fn inclusive(bounds: [f64; 4]) -> Self {
        Self {
            bounds,
            lower_inclusive: true,
        }
    }

    pub const fn exclusive(bounds: [f64; 4]) -> Self {
        Self {
            bounds,
            lower_inclusive: false,
        }
    }

    /// Select the highest tier whose lower bound the value has reached.
    ///
    /// Negative values are clamped to zero first.
    pub fn classify(&self, value: f64) -> SeverityTier {
        let value = value.max(0.0);
        let crossed = self
            .bounds
            .iter()
            .filter(|&&bound| {
                if self.lower_inclusive {
                    value >= bound
                } else {
                    value > bound
                }
            })
            .count();
        SeverityTier::ALL[crossed]
    }

    /// The lower bound of `tier`, or `None` for Ideal.
    pub fn lower_bound(&self, tier: SeverityTier) -> Option<f64> {
        match tier {
            SeverityTier::Ideal => None,
            SeverityTier::Good => Some(self.bounds[0]),
            SeverityTier::Caution => Some(self.bounds[1]),
            SeverityTier::Warning => Some(self.bounds[2]),
            SeverityTier::Critical => Some(self.bounds[3]),
        }
    }
}

// ---------------------------------------------------------------------------
// Threshold table
// ---------------------------------------------------------------------------

/// Per-metric tier bounds. Always complete and monotonic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<MetricKind, TierBounds>",
    into = "BTreeMap<MetricKind, TierBounds>"
)]
pub struct ThresholdTable {
    bands: [TierBounds; 5],
}

const PERCENT_BANDS: TierBounds = TierBounds::inclusive([25.0, 50.0, 75.0, 90.0]);
const TEMPERATURE_BANDS: TierBounds = TierBounds::inclusive([50.0, 60.0, 70.0, 80.0]);
const FAN_SPEED_BANDS: TierBounds = TierBounds::exclusive([35.0, 50.0, 65.0, 80.0]);

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            bands: [
                PERCENT_BANDS,
                PERCENT_BANDS,
                TEMPERATURE_BANDS,
                FAN_SPEED_BANDS,
                PERCENT_BANDS,
            ],
        }
    }
}

impl ThresholdTable {
    /// Build a table from per-metric bounds.
    ///
    /// Every [`MetricKind`] must be present and each set of bounds must be
    /// finite and strictly ascending.
    pub fn new(mut bands: BTreeMap<MetricKind, TierBounds>) -> Result<Self, CoreError> {
        let mut table = Self::default();
        for kind in MetricKind::ALL {
            let bounds = bands.remove(&kind).ok_or_else(|| {
                CoreError::Configuration(format!("threshold table is missing metric {kind}"))
            })?;
            validate_ascending_bounds(&bounds.bounds, kind.name())?;
            table.bands[kind.position()] = bounds;
        }
        Ok(table)
    }

    /// Parse and validate a JSON threshold table keyed by canonical metric name.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        serde_json::from_str(json)
            .map_err(|e| CoreError::Configuration(format!("invalid threshold table: {e}")))
    }

    pub fn bounds(&self, kind: MetricKind) -> &TierBounds {
        &self.bands[kind.position()]
    }

    /// Classify `value` for the given metric kind.
    pub fn classify(&self, kind: MetricKind, value: f64) -> SeverityTier {
        self.bounds(kind).classify(value)
    }
}

impl TryFrom<BTreeMap<MetricKind, TierBounds>> for ThresholdTable {
    type Error = CoreError;

    fn try_from(bands: BTreeMap<MetricKind, TierBounds>) -> Result<Self, Self::Error> {
        Self::new(bands)
    }
}

impl From<ThresholdTable> for BTreeMap<MetricKind, TierBounds> {
    fn from(table: ThresholdTable) -> Self {
        MetricKind::ALL
            .into_iter()
            .map(|kind| (kind, *table.bounds(kind)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::snapshot::fixtures::reading;

    use assert_matches::assert_matches;

    // -- default bands --------------------------------------------------------

    #[test]
    fn utilization_bands() {
        let table = ThresholdTable::default();
        let kind = MetricKind::Utilization;
        assert_eq!(table.classify(kind, 0.0), SeverityTier::Ideal);
        assert_eq!(table.classify(kind, 24.9), SeverityTier::Ideal);
        assert_eq!(table.classify(kind, 25.0), SeverityTier::Good);
        assert_eq!(table.classify(kind, 50.0), SeverityTier::Caution);
        assert_eq!(table.classify(kind, 75.0), SeverityTier::Warning);
        assert_eq!(table.classify(kind, 90.0), SeverityTier::Critical);
        assert_eq!(table.classify(kind, 100.0), SeverityTier::Critical);
    }

    #[test]
    fn temperature_bands() {
        let table = ThresholdTable::default();
        let kind = MetricKind::Temperature;
        assert_eq!(table.classify(kind, 49.0), SeverityTier::Ideal);
        assert_eq!(table.classify(kind, 55.0), SeverityTier::Good);
        assert_eq!(table.classify(kind, 68.0), SeverityTier::Caution);
        assert_eq!(table.classify(kind, 72.0), SeverityTier::Warning);
        assert_eq!(table.classify(kind, 85.0), SeverityTier::Critical);
        assert_eq!(table.classify(kind, 140.0), SeverityTier::Critical);
    }

    #[test]
    fn fan_speed_bounds_are_exclusive() {
        let table = ThresholdTable::default();
        let kind = MetricKind::FanSpeed;
        assert_eq!(table.classify(kind, 35.0), SeverityTier::Ideal);
        assert_eq!(table.classify(kind, 35.5), SeverityTier::Good);
        assert_eq!(table.classify(kind, 50.0), SeverityTier::Good);
        assert_eq!(table.classify(kind, 65.0), SeverityTier::Caution);
        assert_eq!(table.classify(kind, 80.0), SeverityTier::Warning);
        assert_eq!(table.classify(kind, 81.0), SeverityTier::Critical);
    }

    #[test]
    fn negative_values_clamp_to_ideal() {
        let table = ThresholdTable::default();
        assert_eq!(table.classify(MetricKind::Temperature, -5.0), SeverityTier::Ideal);
    }

    #[test]
    fn over_full_memory_is_still_critical() {
        let table = ThresholdTable::default();
        assert_eq!(
            table.classify(MetricKind::VramUsedPercent, 104.0),
            SeverityTier::Critical
        );
        assert_eq!(MetricKind::VramUsedPercent.display_value(104.0), 100.0);
    }

    #[test]
    fn classify_is_monotonic_for_every_kind() {
        let table = ThresholdTable::default();
        for kind in MetricKind::ALL {
            let mut previous = SeverityTier::Ideal;
            for step in 0..=1500 {
                let value = f64::from(step) / 10.0;
                let tier = table.classify(kind, value);
                assert!(tier >= previous, "{kind} dropped from {previous:?} to {tier:?} at {value}");
                previous = tier;
            }
        }
    }

    #[test]
    fn lower_bound_per_tier() {
        let bounds = TEMPERATURE_BANDS;
        assert_eq!(bounds.lower_bound(SeverityTier::Ideal), None);
        assert_eq!(bounds.lower_bound(SeverityTier::Warning), Some(70.0));
        assert_eq!(bounds.lower_bound(SeverityTier::Critical), Some(80.0));
    }

    // -- metric extraction ----------------------------------------------------

    #[test]
    fn vram_percent_computed_from_used_and_total() {
        let mut r = reading(0, 40.0);
        r.memory_used_mb = 14400;
        r.memory_total_mb = 16000;
        let value = MetricKind::VramUsedPercent.value_of(&r).unwrap();
        assert!((value - 90.0).abs() < 1e-9);
    }

    #[test]
    fn zero_memory_total_is_undefined() {
        let mut r = reading(3, 40.0);
        r.memory_total_mb = 0;
        assert_matches!(
            MetricKind::VramUsedPercent.value_of(&r),
            Err(CoreError::UndefinedMetric { gpu_index: 3, metric: METRIC_VRAM_USED_PERCENT })
        );
    }

    #[test]
    fn missing_fan_and_zero_power_limit_are_undefined() {
        let mut r = reading(0, 40.0);
        r.fan_speed_percent = None;
        r.power_limit_watts = 0.0;
        assert!(MetricKind::FanSpeed.value_of(&r).is_err());
        assert!(MetricKind::PowerDrawPercent.value_of(&r).is_err());
    }

    #[test]
    fn power_draw_percent_uses_power_limit() {
        let mut r = reading(0, 40.0);
        r.power_draw_watts = Some(270.0);
        r.power_limit_watts = 300.0;
        let value = MetricKind::PowerDrawPercent.value_of(&r).unwrap();
        assert!((value - 90.0).abs() < 1e-9);
    }

    // -- table construction ---------------------------------------------------

    #[test]
    fn table_round_trips_through_json() {
        let json = serde_json::to_string(&ThresholdTable::default()).unwrap();
        assert!(json.contains("temperature_celsius"));
        let parsed = ThresholdTable::from_json(&json).unwrap();
        assert_eq!(parsed, ThresholdTable::default());
    }

    #[test]
    fn override_changes_classification() {
        let json = r#"{
            "utilization_percent": { "bounds": [10, 20, 30, 40] },
            "vram_used_percent": { "bounds": [25, 50, 75, 90] },
            "temperature_celsius": { "bounds": [40, 50, 60, 65] },
            "fan_speed_percent": { "bounds": [35, 50, 65, 80], "lower_inclusive": false },
            "power_draw_percent": { "bounds": [25, 50, 75, 90] }
        }"#;
        let table = ThresholdTable::from_json(json).unwrap();
        assert_eq!(table.classify(MetricKind::Temperature, 66.0), SeverityTier::Critical);
        assert_eq!(table.classify(MetricKind::Utilization, 35.0), SeverityTier::Warning);
        assert!(!table.bounds(MetricKind::FanSpeed).lower_inclusive);
    }

    #[test]
    fn missing_metric_kind_is_rejected() {
        let json = r#"{ "temperature_celsius": { "bounds": [50, 60, 70, 80] } }"#;
        assert_matches!(ThresholdTable::from_json(json), Err(CoreError::Configuration(_)));
    }

    #[test]
    fn non_monotonic_bounds_are_rejected() {
        let mut bands: BTreeMap<MetricKind, TierBounds> = ThresholdTable::default().into();
        bands.insert(
            MetricKind::Temperature,
            TierBounds::inclusive([50.0, 70.0, 60.0, 80.0]),
        );
        assert_matches!(ThresholdTable::new(bands), Err(CoreError::Configuration(_)));
    }

    #[test]
    fn unknown_metric_name_is_rejected() {
        let json = r#"{ "voltage": { "bounds": [1, 2, 3, 4] } }"#;
        assert!(ThresholdTable::from_json(json).is_err());
    }
}
