//! Sample and event model, domain records, and settings types.
//!
//! These types are the vocabulary shared by every other module: the engine
//! consumes `FuelDataEvent`s built from raw telemetry, steps the FSMs
//! against `FuelSample`s, and produces `FuelCharge`/`FuelDischarge` records
//! alongside outbound `EngineCommand`s and `Alert`s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifiers. These are thin wrappers rather than bare `Uuid`/
/// `String` so a tank id can never be passed where an object id is expected.
pub type OrganizationId = Uuid;
pub type ObjectId = Uuid;
pub type ObjectModelId = Uuid;
pub type TankParameterId = Uuid;
pub type FuelChargeId = Uuid;
pub type FuelDischargeId = Uuid;

/// A geographic point carried through telemetry but never used in FSM
/// decisions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lon: f64,
    pub lat: f64,
}

/// A recognized tank on a vehicle/generator, loaded once at startup from the
/// catalog configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankParameter {
    pub id: TankParameterId,
    pub name: String,
    /// Key under which this tank's volume appears in a telemetry event's
    /// parameter map.
    pub msg_attr: String,
}

/// The smallest analyzable observation of one tank at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FuelSample {
    pub time: DateTime<Utc>,
    /// Non-negative; 0 means stationary.
    pub speed: f64,
    /// Liters, >= 0.
    pub fuel_volume: f64,
    pub location: Option<Location>,
    /// Signed liters/second, derived from the previous sample. Only the
    /// discharge FSM reads this field; the charge FSM ignores it.
    pub fuel_speed: f64,
}

impl FuelSample {
    pub fn new(time: DateTime<Utc>, speed: f64, fuel_volume: f64, location: Option<Location>) -> Self {
        Self {
            time,
            speed,
            fuel_volume,
            location,
            fuel_speed: 0.0,
        }
    }

    /// Computes `fuel_speed` relative to a previous sample. Zero when the
    /// timestamps are equal (no duration to divide by).
    pub fn with_fuel_speed(mut self, prev: &FuelSample) -> Self {
        let duration = (self.time - prev.time).num_milliseconds() as f64 / 1000.0;
        if duration > 0.0 {
            self.fuel_speed = (self.fuel_volume - prev.fuel_volume) / duration;
        } else {
            self.fuel_speed = 0.0;
        }
        self
    }
}

/// Envelope around a `FuelSample`, naming which tenant/asset/tank it
/// belongs to. The routing key for all per-key engine state is
/// `(object_id, tank.id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelDataEvent {
    pub organization_id: OrganizationId,
    pub object_id: ObjectId,
    pub model_id: ObjectModelId,
    pub tank: TankParameter,
    pub sample: FuelSample,
}

impl FuelDataEvent {
    pub fn key(&self) -> (ObjectId, TankParameterId) {
        (self.object_id, self.tank.id)
    }
}

/// A detected refueling event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelCharge {
    pub id: FuelChargeId,
    pub organization_id: OrganizationId,
    pub object_id: ObjectId,
    pub tank_id: TankParameterId,
    pub location: Option<Location>,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub volume_begin: f64,
    pub volume_end: f64,
    /// `volume_end - volume_begin`, positive.
    pub volume: f64,
    pub is_complete: bool,
}

impl FuelCharge {
    pub fn open(
        organization_id: OrganizationId,
        object_id: ObjectId,
        tank_id: TankParameterId,
        begin_sample: &FuelSample,
        end_sample: &FuelSample,
    ) -> Self {
        let volume = end_sample.fuel_volume - begin_sample.fuel_volume;
        Self {
            id: Uuid::new_v4(),
            organization_id,
            object_id,
            tank_id,
            location: begin_sample.location,
            begin: begin_sample.time,
            end: end_sample.time,
            volume_begin: begin_sample.fuel_volume,
            volume_end: end_sample.fuel_volume,
            volume,
            is_complete: false,
        }
    }

    pub fn update_end(&mut self, sample: &FuelSample) {
        self.end = sample.time;
        self.volume_end = sample.fuel_volume;
        self.volume = self.volume_end - self.volume_begin;
    }

    pub fn close(&mut self) {
        self.is_complete = true;
    }
}

/// A detected discharge (theft, leak, drain).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelDischarge {
    pub id: FuelDischargeId,
    pub organization_id: OrganizationId,
    pub object_id: ObjectId,
    pub tank_id: TankParameterId,
    pub location: Option<Location>,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub volume_begin: f64,
    pub volume_end: f64,
    /// `volume_begin - volume_end`, positive.
    pub volume: f64,
    pub is_complete: bool,
}

impl FuelDischarge {
    pub fn open(
        organization_id: OrganizationId,
        object_id: ObjectId,
        tank_id: TankParameterId,
        begin_sample: &FuelSample,
        end_sample: &FuelSample,
    ) -> Self {
        let volume = begin_sample.fuel_volume - end_sample.fuel_volume;
        Self {
            id: Uuid::new_v4(),
            organization_id,
            object_id,
            tank_id,
            location: begin_sample.location,
            begin: begin_sample.time,
            end: end_sample.time,
            volume_begin: begin_sample.fuel_volume,
            volume_end: end_sample.fuel_volume,
            volume,
            is_complete: false,
        }
    }

    pub fn update_end(&mut self, sample: &FuelSample) {
        self.end = sample.time;
        self.volume_end = sample.fuel_volume;
        self.volume = self.volume_begin - self.volume_end;
    }

    pub fn close(&mut self) {
        self.is_complete = true;
    }
}

/// Settings governing charge detection for a given `(organization, tank,
/// object-or-model)` binding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargeSettings {
    pub min_volume: f64,
    pub min_duration_in_secs: i64,
    pub min_duration_out_secs: i64,
    pub min_duration_sudden_secs: i64,
    pub ignore_on_speed: bool,
    pub ignore_duration_begin_move_secs: i64,
}

impl Default for ChargeSettings {
    fn default() -> Self {
        use crate::config::defaults::{
            CHARGE_MIN_DURATION_IN_SECS, CHARGE_MIN_DURATION_OUT_SECS, CHARGE_MIN_DURATION_SUDDEN_SECS,
            CHARGE_MIN_VOLUME,
        };
        Self {
            min_volume: CHARGE_MIN_VOLUME,
            min_duration_in_secs: CHARGE_MIN_DURATION_IN_SECS,
            min_duration_out_secs: CHARGE_MIN_DURATION_OUT_SECS,
            min_duration_sudden_secs: CHARGE_MIN_DURATION_SUDDEN_SECS,
            ignore_on_speed: false,
            ignore_duration_begin_move_secs: 0,
        }
    }
}

/// Settings governing discharge detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DischargeSettings {
    pub min_volume: f64,
    /// Magnitude, liters/second.
    pub max_fuel_speed: f64,
    pub min_stoppage_duration_secs: i64,
    pub ignore_on_speed: bool,
    pub ignore_duration_begin_move_secs: i64,
}

impl Default for DischargeSettings {
    fn default() -> Self {
        use crate::config::defaults::{
            DISCHARGE_MAX_FUEL_SPEED, DISCHARGE_MIN_STOPPAGE_DURATION_SECS, DISCHARGE_MIN_VOLUME,
        };
        Self {
            min_volume: DISCHARGE_MIN_VOLUME,
            max_fuel_speed: DISCHARGE_MAX_FUEL_SPEED,
            min_stoppage_duration_secs: DISCHARGE_MIN_STOPPAGE_DURATION_SECS,
            ignore_on_speed: false,
            ignore_duration_begin_move_secs: 0,
        }
    }
}

/// One of `object_id` or `model_id` is set, never both — enforced by the
/// constructors rather than the type itself, matching how the settings
/// storage this is grounded on distinguishes the two binding kinds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SettingsBinding {
    Object(ObjectId),
    Model(ObjectModelId),
}

/// Permanent (non-interval) settings bound to an organization/tank and
/// either an object or a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectFuelSettings {
    pub id: Uuid,
    pub organization_id: OrganizationId,
    pub tank_id: TankParameterId,
    pub binding: SettingsBinding,
    pub charge: ChargeSettings,
    pub discharge: DischargeSettings,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ObjectFuelSettings {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Settings that apply only within a half-open `(begin, end]` window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectFuelIntervalSettings {
    pub id: Uuid,
    pub organization_id: OrganizationId,
    pub tank_id: TankParameterId,
    pub binding: SettingsBinding,
    pub charge: ChargeSettings,
    pub discharge: DischargeSettings,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ObjectFuelIntervalSettings {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// `begin < time <= end`.
    pub fn covers(&self, time: DateTime<Utc>) -> bool {
        self.begin < time && time <= self.end
    }
}

/// Outbound lifecycle commands the pipeline hands to a `FuelEventEmitter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineCommand {
    BeginFuelCharge(FuelCharge),
    SetFuelCharge(FuelCharge),
    EndFuelCharge(FuelCharge),
    BeginFuelDischarge(FuelDischarge),
    SetFuelDischarge(FuelDischarge),
    EndFuelDischarge(FuelDischarge),
    DeleteFuelDischarge { id: FuelDischargeId, organization_id: OrganizationId },
}

/// An advisory alert accompanying a begin/end command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub organization_id: OrganizationId,
    pub object_id: ObjectId,
    pub event: &'static str,
    pub create_time: DateTime<Utc>,
    pub tank_name: String,
    pub volume_begin: f64,
    pub volume_end: f64,
    pub volume: f64,
    pub begin_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn fuel_speed_zero_on_equal_timestamps() {
        let prev = FuelSample::new(t(0), 0.0, 100.0, None);
        let sample = FuelSample::new(t(0), 0.0, 120.0, None).with_fuel_speed(&prev);
        assert_eq!(sample.fuel_speed, 0.0);
    }

    #[test]
    fn fuel_speed_negative_on_drop() {
        let prev = FuelSample::new(t(0), 0.0, 500.0, None);
        let sample = FuelSample::new(t(5), 0.0, 499.0, None).with_fuel_speed(&prev);
        assert!((sample.fuel_speed - (-0.2)).abs() < 1e-9);
    }

    #[test]
    fn charge_volume_is_positive_delta() {
        let begin = FuelSample::new(t(0), 0.0, 100.0, None);
        let end = FuelSample::new(t(10), 0.0, 120.0, None);
        let charge = FuelCharge::open(Uuid::nil(), Uuid::nil(), Uuid::nil(), &begin, &end);
        assert_eq!(charge.volume, 20.0);
        assert!(!charge.is_complete);
    }

    #[test]
    fn discharge_volume_is_positive_delta() {
        let begin = FuelSample::new(t(0), 0.0, 500.0, None);
        let end = FuelSample::new(t(10), 0.0, 300.0, None);
        let discharge = FuelDischarge::open(Uuid::nil(), Uuid::nil(), Uuid::nil(), &begin, &end);
        assert_eq!(discharge.volume, 200.0);
    }

    #[test]
    fn interval_settings_half_open_window() {
        let settings = ObjectFuelIntervalSettings {
            id: Uuid::nil(),
            organization_id: Uuid::nil(),
            tank_id: Uuid::nil(),
            binding: SettingsBinding::Object(Uuid::nil()),
            charge: ChargeSettings::default(),
            discharge: DischargeSettings::default(),
            begin: t(0),
            end: t(100),
            created_at: t(0),
            deleted_at: None,
        };
        assert!(!settings.covers(t(0)));
        assert!(settings.covers(t(1)));
        assert!(settings.covers(t(100)));
        assert!(!settings.covers(t(101)));
    }
}
