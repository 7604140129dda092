//! Built-in default constants for charge/discharge detection.
//!
//! These are the values `ChargeSettings::default()`/`DischargeSettings::default()`
//! resolve to when no permanent or interval settings apply — tier 5 of the
//! `SettingsResolver` lookup order.

/// Minimum volume rise (liters) to confirm a charge.
pub const CHARGE_MIN_VOLUME: f64 = 150.0;

/// Minimum duration (seconds) a rise must hold before confirming a charge.
pub const CHARGE_MIN_DURATION_IN_SECS: i64 = 30;

/// Minimum duration (seconds) a drop must hold before confirming the charge
/// ended.
pub const CHARGE_MIN_DURATION_OUT_SECS: i64 = 5;

/// Minimum gap (seconds) between samples for a single-step jump to count as
/// a sudden charge.
pub const CHARGE_MIN_DURATION_SUDDEN_SECS: i64 = 30;

/// Minimum volume drop (liters) to confirm a discharge.
pub const DISCHARGE_MIN_VOLUME: f64 = 100.0;

/// Magnitude (liters/second) the fuel-speed must exceed to suspect a
/// discharge.
pub const DISCHARGE_MAX_FUEL_SPEED: f64 = 0.300;

/// Minimum stationary duration (seconds) before a discharge can be
/// confirmed.
pub const DISCHARGE_MIN_STOPPAGE_DURATION_SECS: i64 = 30;

/// Fixed post-discharge probation window (seconds) during which a refill or
/// flat reading can cancel a tentative discharge as a false alarm.
pub const EXIT_DISCHARGING_DURATION_SECS: i64 = 60;
