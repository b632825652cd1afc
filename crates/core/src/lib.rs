//! `gpuwatch-core` -- pure GPU telemetry domain logic.
//!
//! No async runtime and no I/O: the agent crate feeds snapshots in and
//! publishes the resulting views.

pub mod alert;
pub mod error;
pub mod hardware;
pub mod metric_names;
pub mod monitor_config;
pub mod threshold_validation;
pub mod types;
