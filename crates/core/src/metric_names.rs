//! Canonical GPU metric names.
//!
//! These names key the threshold table, form part of every alert id, and
//! fix the order in which metrics are evaluated within a cycle.

/// GPU compute utilization percentage (0-100).
pub const METRIC_UTILIZATION: &str = "utilization_percent";

/// VRAM utilization as a percentage (computed from used / total).
pub const METRIC_VRAM_USED_PERCENT: &str = "vram_used_percent";

/// GPU core temperature in degrees Celsius.
pub const METRIC_TEMPERATURE: &str = "temperature_celsius";

/// Primary fan speed percentage (0-100).
pub const METRIC_FAN_SPEED: &str = "fan_speed_percent";

/// Power draw as a percentage of the enforced power limit.
pub const METRIC_POWER_DRAW_PERCENT: &str = "power_draw_percent";
