//! Hardware monitoring domain logic.
//!
//! Contains the snapshot model, severity classification, derived-metric
//! tracking, the alert lifecycle and the per-cycle pipeline that ties them
//! together. All logic in this module is pure (no I/O, no timers) so it can
//! be tested in isolation.

pub mod alerts;
pub mod history;
pub mod monitor;
pub mod snapshot;
pub mod thresholds;
