//! Alert lifecycle per (GPU, metric) pair.
//!
//! Each key moves through Quiet -> Open -> Resolved. Quiet is simply the
//! absence of a record; a resolved record stays until it is dismissed, and
//! re-opens in place if the metric crosses Warning again first. At most one
//! record exists per key, so at most one open alert per key.

use std::collections::BTreeMap;

use crate::alert::{Alert, AlertId, AlertSeverity, AlertTransition, TransitionKind};
use crate::hardware::thresholds::{MetricKind, SeverityTier, TierBounds};
use crate::types::{GpuIndex, Timestamp};

type AlertKey = (GpuIndex, MetricKind);

/// One classified metric value ready for lifecycle evaluation.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub gpu_index: GpuIndex,
    pub metric: MetricKind,
    pub value: f64,
    pub tier: SeverityTier,
    pub bounds: &'a TierBounds,
    pub at: Timestamp,
}

/// Opens, updates, resolves and dismisses alerts.
///
/// Records are keyed by (GPU index, metric) and iterate in that order, so
/// identical observation sequences always yield identical alert lists.
#[derive(Debug, Default)]
pub struct AlertLifecycle {
    records: BTreeMap<AlertKey, Alert>,
}

impl AlertLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one observation and report the resulting transition, if any.
    pub fn observe(&mut self, obs: Observation<'_>) -> Option<AlertTransition> {
        let key = (obs.gpu_index, obs.metric);

        let Some(severity) = AlertSeverity::from_tier(obs.tier) else {
            return self.resolve(key, &obs);
        };
        // Tiers that alert always have a lower bound.
        let threshold = obs.bounds.lower_bound(obs.tier).unwrap_or(obs.value);
        let message = excursion_message(&obs, severity, threshold);

        let Some(alert) = self.records.get_mut(&key) else {
            let alert = Alert {
                id: AlertId::new(obs.gpu_index, obs.metric),
                gpu_index: obs.gpu_index,
                metric: obs.metric,
                severity,
                current_value: obs.value,
                threshold_value: threshold,
                message,
                opened_at: obs.at,
                updated_at: obs.at,
                resolved_at: None,
            };
            let transition = transition(&alert, TransitionKind::Opened);
            self.records.insert(key, alert);
            return Some(transition);
        };

        if !alert.is_open() {
            alert.severity = severity;
            alert.current_value = obs.value;
            alert.threshold_value = threshold;
            alert.message = message;
            alert.opened_at = obs.at;
            alert.updated_at = obs.at;
            alert.resolved_at = None;
            return Some(transition(alert, TransitionKind::Opened));
        }

        let kind = if alert.severity != severity {
            TransitionKind::SeverityChanged
        } else if alert.current_value != obs.value || alert.threshold_value != threshold {
            TransitionKind::Refreshed
        } else {
            return None;
        };

        alert.severity = severity;
        alert.current_value = obs.value;
        alert.threshold_value = threshold;
        alert.message = message;
        alert.updated_at = obs.at;
        Some(transition(alert, kind))
    }

    fn resolve(&mut self, key: AlertKey, obs: &Observation<'_>) -> Option<AlertTransition> {
        let alert = self.records.get_mut(&key).filter(|a| a.is_open())?;

        alert.severity = AlertSeverity::Resolved;
        alert.resolved_at = Some(obs.at);
        alert.updated_at = obs.at;
        alert.message = format!(
            "GPU {} {} recovered to {:.1} (below warning threshold {:.1})",
            obs.gpu_index,
            obs.metric,
            obs.value,
            obs.bounds.lower_bound(SeverityTier::Warning).unwrap_or(obs.value),
        );
        Some(transition(alert, TransitionKind::Resolved))
    }

    /// Remove an alert by id regardless of its state.
    ///
    /// Returns the removed record, or `None` if no alert has that id.
    pub fn dismiss(&mut self, id: &str) -> Option<Alert> {
        let key = self
            .records
            .iter()
            .find(|(_, alert)| alert.id.as_str() == id)
            .map(|(key, _)| *key)?;
        self.records.remove(&key)
    }

    /// All open and resolved alerts in (GPU index, metric) order.
    pub fn alerts(&self) -> impl Iterator<Item = &Alert> {
        self.records.values()
    }

    pub fn open_count(&self) -> usize {
        self.records.values().filter(|a| a.is_open()).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn excursion_message(obs: &Observation<'_>, severity: AlertSeverity, threshold: f64) -> String {
    format!(
        "GPU {} {} {:.1} exceeded {severity} threshold {:.1}",
        obs.gpu_index, obs.metric, obs.value, threshold
    )
}

fn transition(alert: &Alert, kind: TransitionKind) -> AlertTransition {
    AlertTransition {
        id: alert.id.clone(),
        kind,
        severity: alert.severity,
        value: alert.current_value,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::thresholds::ThresholdTable;

    use assert_matches::assert_matches;
    use chrono::{DateTime, Utc};

    fn at(secs: i64) -> Timestamp {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).expect("valid timestamp")
    }

    fn observe_temp(
        lifecycle: &mut AlertLifecycle,
        table: &ThresholdTable,
        gpu_index: GpuIndex,
        value: f64,
        secs: i64,
    ) -> Option<AlertTransition> {
        let metric = MetricKind::Temperature;
        lifecycle.observe(Observation {
            gpu_index,
            metric,
            value,
            tier: table.classify(metric, value),
            bounds: table.bounds(metric),
            at: at(secs),
        })
    }

    #[test]
    fn quiet_metric_creates_nothing() {
        let table = ThresholdTable::default();
        let mut lifecycle = AlertLifecycle::new();
        assert!(observe_temp(&mut lifecycle, &table, 0, 65.0, 0).is_none());
        assert!(lifecycle.is_empty());
    }

    #[test]
    fn warning_opens_alert_with_threshold() {
        let table = ThresholdTable::default();
        let mut lifecycle = AlertLifecycle::new();
        let t = observe_temp(&mut lifecycle, &table, 0, 72.0, 0).unwrap();
        assert_eq!(t.kind, TransitionKind::Opened);
        assert_eq!(t.severity, AlertSeverity::Warning);

        let alert = lifecycle.alerts().next().unwrap();
        assert_eq!(alert.id.as_str(), "gpu0:temperature_celsius");
        assert_eq!(alert.threshold_value, 70.0);
        assert_eq!(alert.opened_at, at(0));
        assert!(alert.is_open());
    }

    #[test]
    fn escalation_updates_in_place() {
        let table = ThresholdTable::default();
        let mut lifecycle = AlertLifecycle::new();
        observe_temp(&mut lifecycle, &table, 0, 72.0, 0);
        let t = observe_temp(&mut lifecycle, &table, 0, 85.0, 1).unwrap();
        assert_eq!(t.kind, TransitionKind::SeverityChanged);
        assert_eq!(lifecycle.len(), 1);

        let alert = lifecycle.alerts().next().unwrap();
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(alert.threshold_value, 80.0);
        assert_eq!(alert.current_value, 85.0);
        assert_eq!(alert.opened_at, at(0));
        assert_eq!(alert.updated_at, at(1));
    }

    #[test]
    fn value_change_within_tier_refreshes() {
        let table = ThresholdTable::default();
        let mut lifecycle = AlertLifecycle::new();
        observe_temp(&mut lifecycle, &table, 0, 72.0, 0);
        let t = observe_temp(&mut lifecycle, &table, 0, 74.0, 1).unwrap();
        assert_eq!(t.kind, TransitionKind::Refreshed);
    }

    #[test]
    fn identical_observation_is_idempotent() {
        let table = ThresholdTable::default();
        let mut lifecycle = AlertLifecycle::new();
        observe_temp(&mut lifecycle, &table, 0, 85.0, 0);
        let before = lifecycle.alerts().next().unwrap().clone();

        assert!(observe_temp(&mut lifecycle, &table, 0, 85.0, 0).is_none());
        assert_eq!(lifecycle.alerts().next().unwrap(), &before);
    }

    #[test]
    fn dropping_below_warning_resolves_and_keeps_record() {
        let table = ThresholdTable::default();
        let mut lifecycle = AlertLifecycle::new();
        observe_temp(&mut lifecycle, &table, 0, 85.0, 0);
        let t = observe_temp(&mut lifecycle, &table, 0, 68.0, 1).unwrap();
        assert_eq!(t.kind, TransitionKind::Resolved);

        let alert = lifecycle.alerts().next().unwrap();
        assert_eq!(alert.severity, AlertSeverity::Resolved);
        assert_eq!(alert.resolved_at, Some(at(1)));
        assert_eq!(lifecycle.open_count(), 0);
        assert_eq!(lifecycle.len(), 1);

        // Staying quiet does not touch the resolved record again.
        assert!(observe_temp(&mut lifecycle, &table, 0, 60.0, 2).is_none());
        assert_eq!(lifecycle.alerts().next().unwrap().resolved_at, Some(at(1)));
    }

    #[test]
    fn resolved_alert_reopens_with_same_id() {
        let table = ThresholdTable::default();
        let mut lifecycle = AlertLifecycle::new();
        observe_temp(&mut lifecycle, &table, 0, 75.0, 0);
        observe_temp(&mut lifecycle, &table, 0, 65.0, 1);
        let t = observe_temp(&mut lifecycle, &table, 0, 76.0, 2).unwrap();

        assert_eq!(t.kind, TransitionKind::Opened);
        assert_eq!(t.id.as_str(), "gpu0:temperature_celsius");
        let alert = lifecycle.alerts().next().unwrap();
        assert!(alert.is_open());
        assert_eq!(alert.opened_at, at(2));
        assert_eq!(lifecycle.len(), 1);
    }

    #[test]
    fn dismiss_removes_only_target() {
        let table = ThresholdTable::default();
        let mut lifecycle = AlertLifecycle::new();
        observe_temp(&mut lifecycle, &table, 0, 85.0, 0);
        observe_temp(&mut lifecycle, &table, 1, 85.0, 0);

        let removed = lifecycle.dismiss("gpu1:temperature_celsius");
        assert_matches!(removed, Some(Alert { gpu_index: 1, .. }));
        assert_eq!(lifecycle.len(), 1);
        assert_eq!(lifecycle.alerts().next().unwrap().gpu_index, 0);

        assert!(lifecycle.dismiss("gpu1:temperature_celsius").is_none());
        assert!(lifecycle.dismiss("no-such-alert").is_none());
        assert_eq!(lifecycle.len(), 1);
    }

    #[test]
    fn dismissed_open_alert_reopens_on_next_excursion() {
        let table = ThresholdTable::default();
        let mut lifecycle = AlertLifecycle::new();
        observe_temp(&mut lifecycle, &table, 0, 85.0, 0);
        lifecycle.dismiss("gpu0:temperature_celsius");

        let t = observe_temp(&mut lifecycle, &table, 0, 86.0, 1).unwrap();
        assert_eq!(t.kind, TransitionKind::Opened);
        assert_eq!(lifecycle.alerts().next().unwrap().opened_at, at(1));
    }

    #[test]
    fn alerts_iterate_in_gpu_then_metric_order() {
        let table = ThresholdTable::default();
        let mut lifecycle = AlertLifecycle::new();
        observe_temp(&mut lifecycle, &table, 2, 85.0, 0);
        observe_temp(&mut lifecycle, &table, 0, 85.0, 0);
        lifecycle.observe(Observation {
            gpu_index: 0,
            metric: MetricKind::Utilization,
            value: 95.0,
            tier: SeverityTier::Critical,
            bounds: table.bounds(MetricKind::Utilization),
            at: at(0),
        });

        let ids: Vec<_> = lifecycle.alerts().map(|a| a.id.to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "gpu0:utilization_percent",
                "gpu0:temperature_celsius",
                "gpu2:temperature_celsius",
            ]
        );
    }
}
