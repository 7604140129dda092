//! Charge (refueling) detection state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    Alert, ChargeSettings, EngineCommand, FuelCharge, FuelDataEvent, FuelSample, ObjectId,
    OrganizationId,
};

/// Charge detection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargeFsmState {
    Free,
    MaybeCharging,
    Charging,
    MaybeFree,
}

/// Per-key state for the charge FSM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeState {
    pub state: ChargeFsmState,
    /// Last sample ingested.
    pub current_data: FuelSample,
    /// Sample at which `state` was entered.
    pub state_data: FuelSample,

    pub time_threshold: Option<DateTime<Utc>>,
    pub fuel_volume_threshold: Option<f64>,
    pub begin_move_threshold: Option<DateTime<Utc>>,

    pub current_charge: Option<FuelCharge>,
}

impl ChargeState {
    /// Fresh `Free` state seeded from the first sample seen for a key.
    pub fn from_sample(sample: FuelSample) -> Self {
        Self {
            state: ChargeFsmState::Free,
            current_data: sample,
            state_data: sample,
            time_threshold: None,
            fuel_volume_threshold: None,
            begin_move_threshold: None,
            current_charge: None,
        }
    }

    /// Rehydrates mid-operation state from an incomplete stored charge.
    /// Threshold fields come back unset — they are re-derived from the
    /// sample stream, never persisted.
    pub fn from_incomplete_charge(charge: FuelCharge) -> Self {
        let state_data = FuelSample::new(charge.begin, 0.0, charge.volume_begin, charge.location);
        let current_data = FuelSample::new(charge.end, 0.0, charge.volume_end, charge.location);
        Self {
            state: ChargeFsmState::Charging,
            current_data,
            state_data,
            time_threshold: None,
            fuel_volume_threshold: None,
            begin_move_threshold: None,
            current_charge: Some(charge),
        }
    }

    fn begin_move_threshold_completed(&self, time: DateTime<Utc>) -> bool {
        match self.begin_move_threshold {
            Some(t) => time > t,
            None => true,
        }
    }

    fn time_threshold_completed(&self, time: DateTime<Utc>) -> bool {
        match self.time_threshold {
            Some(t) => time >= t,
            None => true,
        }
    }

    fn fuel_volume_threshold_completed(&self, volume: f64) -> bool {
        match self.fuel_volume_threshold {
            Some(v) => volume >= v,
            None => true,
        }
    }

    fn is_sudden_charge(&self, sample: &FuelSample, min_volume: f64, min_duration_secs: i64) -> bool {
        let volume = sample.fuel_volume - self.current_data.fuel_volume;
        let delta = sample.time - self.current_data.time;
        volume > min_volume && delta.num_seconds() > min_duration_secs
    }
}

/// What the charge FSM produced in response to a single sample.
#[derive(Debug, Clone, Default)]
pub struct ChargeStepOutcome {
    pub commands: Vec<EngineCommand>,
    pub alerts: Vec<Alert>,
}

impl ChargeStepOutcome {
    fn begin(organization_id: OrganizationId, object_id: ObjectId, tank_name: &str, charge: FuelCharge) -> Self {
        let alert = Alert {
            organization_id,
            object_id,
            event: "fuel_charge_begin",
            create_time: charge.begin,
            tank_name: tank_name.to_string(),
            volume_begin: charge.volume_begin,
            volume_end: charge.volume_end,
            volume: charge.volume,
            begin_time: charge.begin,
            end_time: charge.end,
            text: format!("Charge started ({tank_name})"),
        };
        Self {
            commands: vec![EngineCommand::BeginFuelCharge(charge)],
            alerts: vec![alert],
        }
    }

    fn update(charge: FuelCharge) -> Self {
        Self {
            commands: vec![EngineCommand::SetFuelCharge(charge)],
            alerts: vec![],
        }
    }

    fn end(organization_id: OrganizationId, object_id: ObjectId, tank_name: &str, charge: FuelCharge) -> Self {
        let alert = Alert {
            organization_id,
            object_id,
            event: "fuel_charge_end",
            create_time: charge.end,
            tank_name: tank_name.to_string(),
            volume_begin: charge.volume_begin,
            volume_end: charge.volume_end,
            volume: charge.volume,
            begin_time: charge.begin,
            end_time: charge.end,
            text: format!("Charge ended ({tank_name})"),
        };
        Self {
            commands: vec![EngineCommand::EndFuelCharge(charge)],
            alerts: vec![alert],
        }
    }
}

/// Pure transition function for charge detection. Consumes a sample,
/// mutates the per-key state, and returns the lifecycle commands/alerts to
/// emit. Does no I/O itself.
pub fn process(state: &mut ChargeState, event: &FuelDataEvent, settings: &ChargeSettings) -> ChargeStepOutcome {
    let sample = event.sample;

    if sample.time < state.current_data.time {
        tracing::warn!(
            object_id = %event.object_id,
            tank_id = %event.tank.id,
            sample_time = %sample.time,
            current_time = %state.current_data.time,
            "stale charge sample dropped"
        );
        return ChargeStepOutcome::default();
    }

    run_begin_move_tracker(state, &sample, settings);

    let (new_fsm_state, outcome) = match state.state {
        ChargeFsmState::Free => handle_free(state, event, settings),
        ChargeFsmState::MaybeCharging => handle_maybe_charging(state, event, settings),
        ChargeFsmState::Charging => handle_charging(state, event, settings),
        ChargeFsmState::MaybeFree => handle_maybe_free(state, event),
    };

    commit(state, &sample, new_fsm_state);
    outcome
}

fn run_begin_move_tracker(state: &mut ChargeState, sample: &FuelSample, settings: &ChargeSettings) {
    if settings.ignore_duration_begin_move_secs > 0 && state.current_data.speed == 0.0 && sample.speed > 0.0 {
        state.begin_move_threshold =
            Some(sample.time + chrono::Duration::seconds(settings.ignore_duration_begin_move_secs));
    }
}

fn commit(state: &mut ChargeState, sample: &FuelSample, new_state: ChargeFsmState) {
    if state.state != new_state {
        state.state = new_state;
        state.state_data = state.current_data;
    }
    state.current_data = *sample;
}

fn handle_free(
    state: &mut ChargeState,
    event: &FuelDataEvent,
    settings: &ChargeSettings,
) -> (ChargeFsmState, ChargeStepOutcome) {
    let sample = event.sample;
    if sample.fuel_volume <= state.current_data.fuel_volume {
        return (ChargeFsmState::Free, ChargeStepOutcome::default());
    }

    if settings.ignore_on_speed && sample.speed > 0.0 {
        return (ChargeFsmState::Free, ChargeStepOutcome::default());
    }

    if settings.min_duration_sudden_secs > 0
        && state.is_sudden_charge(&sample, settings.min_volume, settings.min_duration_sudden_secs)
    {
        let begin_state = state.current_data;
        let charge = FuelCharge::open(event.organization_id, event.object_id, event.tank.id, &begin_state, &sample);
        state.current_charge = Some(charge.clone());
        let outcome = ChargeStepOutcome::begin(event.organization_id, event.object_id, &event.tank.name, charge);
        return (ChargeFsmState::Charging, outcome);
    }

    state.time_threshold = Some(state.current_data.time + chrono::Duration::seconds(settings.min_duration_in_secs));
    state.fuel_volume_threshold = Some(state.current_data.fuel_volume + settings.min_volume);
    (ChargeFsmState::MaybeCharging, ChargeStepOutcome::default())
}

fn handle_maybe_charging(
    state: &mut ChargeState,
    event: &FuelDataEvent,
    settings: &ChargeSettings,
) -> (ChargeFsmState, ChargeStepOutcome) {
    let sample = event.sample;

    if settings.ignore_on_speed && sample.speed > 0.0 {
        return (ChargeFsmState::Free, ChargeStepOutcome::default());
    }
    if settings.ignore_duration_begin_move_secs > 0 && !state.begin_move_threshold_completed(sample.time) {
        return (ChargeFsmState::Free, ChargeStepOutcome::default());
    }
    if sample.fuel_volume < state.current_data.fuel_volume {
        return (ChargeFsmState::Free, ChargeStepOutcome::default());
    }

    if state.time_threshold_completed(sample.time) && state.fuel_volume_threshold_completed(sample.fuel_volume) {
        let begin_state = state.state_data;
        let charge = FuelCharge::open(event.organization_id, event.object_id, event.tank.id, &begin_state, &sample);
        state.current_charge = Some(charge.clone());
        let outcome = ChargeStepOutcome::begin(event.organization_id, event.object_id, &event.tank.name, charge);
        return (ChargeFsmState::Charging, outcome);
    }
    (ChargeFsmState::MaybeCharging, ChargeStepOutcome::default())
}

fn handle_charging(
    state: &mut ChargeState,
    event: &FuelDataEvent,
    settings: &ChargeSettings,
) -> (ChargeFsmState, ChargeStepOutcome) {
    let sample = event.sample;
    if sample.fuel_volume < state.current_data.fuel_volume {
        state.time_threshold =
            Some(state.current_data.time + chrono::Duration::seconds(settings.min_duration_out_secs));
        return (ChargeFsmState::MaybeFree, ChargeStepOutcome::default());
    }

    if let Some(charge) = state.current_charge.as_mut() {
        charge.update_end(&sample);
        let outcome = ChargeStepOutcome::update(charge.clone());
        (ChargeFsmState::Charging, outcome)
    } else {
        (ChargeFsmState::Charging, ChargeStepOutcome::default())
    }
}

fn handle_maybe_free(state: &mut ChargeState, event: &FuelDataEvent) -> (ChargeFsmState, ChargeStepOutcome) {
    let sample = event.sample;

    if sample.fuel_volume <= state.current_data.fuel_volume {
        if state.time_threshold_completed(sample.time) {
            if let Some(charge) = state.current_charge.as_mut() {
                charge.close();
                let closed = charge.clone();
                state.current_charge = None;
                let outcome =
                    ChargeStepOutcome::end(event.organization_id, event.object_id, &event.tank.name, closed);
                return (ChargeFsmState::Free, outcome);
            }
            return (ChargeFsmState::Free, ChargeStepOutcome::default());
        }
        return (ChargeFsmState::MaybeFree, ChargeStepOutcome::default());
    }

    // Volume rose again.
    if sample.speed == 0.0 {
        // Stays in the operation; per design, the in-progress charge's
        // end/volume_end is not extended here — the next
        // Charging -> Charging step catches up.
        (ChargeFsmState::Charging, ChargeStepOutcome::default())
    } else {
        (ChargeFsmState::MaybeFree, ChargeStepOutcome::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TankParameter;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn event(time: DateTime<Utc>, speed: f64, volume: f64) -> FuelDataEvent {
        FuelDataEvent {
            organization_id: Uuid::nil(),
            object_id: Uuid::nil(),
            model_id: Uuid::nil(),
            tank: TankParameter {
                id: Uuid::nil(),
                name: "Main".into(),
                msg_attr: "fuel_main".into(),
            },
            sample: FuelSample::new(time, speed, volume, None),
        }
    }

    #[test]
    fn normal_refuel_scenario() {
        let settings = ChargeSettings::default();
        let mut state = ChargeState::from_sample(FuelSample::new(t(0), 0.0, 100.0, None));

        let o1 = process(&mut state, &event(t(10), 0.0, 120.0), &settings);
        assert!(o1.commands.is_empty());
        assert_eq!(state.state, ChargeFsmState::MaybeCharging);

        let o2 = process(&mut state, &event(t(45), 0.0, 260.0), &settings);
        assert_eq!(o2.commands.len(), 1);
        assert!(matches!(o2.commands[0], EngineCommand::BeginFuelCharge(_)));
        assert_eq!(state.state, ChargeFsmState::Charging);

        let o3 = process(&mut state, &event(t(50), 0.0, 260.0), &settings);
        assert_eq!(o3.commands.len(), 1);
        assert!(matches!(o3.commands[0], EngineCommand::SetFuelCharge(_)));

        let o4 = process(&mut state, &event(t(60), 0.0, 255.0), &settings);
        assert!(o4.commands.is_empty());
        assert_eq!(state.state, ChargeFsmState::MaybeFree);

        let o5 = process(&mut state, &event(t(70), 0.0, 255.0), &settings);
        assert_eq!(o5.commands.len(), 1);
        match &o5.commands[0] {
            EngineCommand::EndFuelCharge(c) => {
                // begin_state is state_data at the MaybeCharging->Charging
                // transition, i.e. the sample before the rise (t=0, v=100);
                // end never advances past the last Charging->Charging
                // update at t=50 (v=260) — MaybeFree->Free doesn't touch it.
                assert_eq!(c.volume_begin, 100.0);
                assert_eq!(c.volume_end, 260.0);
                assert_eq!(c.volume, 160.0);
                assert!(c.is_complete);
            }
            _ => panic!("expected EndFuelCharge"),
        }
        assert_eq!(o5.alerts.len(), 1);
    }

    #[test]
    fn sudden_refuel_scenario() {
        let settings = ChargeSettings::default();
        let mut state = ChargeState::from_sample(FuelSample::new(t(0), 0.0, 100.0, None));
        let outcome = process(&mut state, &event(t(200), 0.0, 400.0), &settings);
        assert_eq!(outcome.commands.len(), 1);
        match &outcome.commands[0] {
            EngineCommand::BeginFuelCharge(c) => {
                assert_eq!(c.volume_begin, 100.0);
                assert!(!c.is_complete);
            }
            _ => panic!("expected BeginFuelCharge"),
        }
        assert_eq!(state.state, ChargeFsmState::Charging);
    }

    #[test]
    fn false_rise_noise_scenario() {
        let settings = ChargeSettings::default();
        let mut state = ChargeState::from_sample(FuelSample::new(t(0), 0.0, 100.0, None));
        let o1 = process(&mut state, &event(t(5), 0.0, 160.0), &settings);
        assert!(o1.commands.is_empty());
        assert_eq!(state.state, ChargeFsmState::MaybeCharging);

        let o2 = process(&mut state, &event(t(10), 0.0, 95.0), &settings);
        assert!(o2.commands.is_empty());
        assert_eq!(state.state, ChargeFsmState::Free);
    }

    #[test]
    fn stale_sample_is_dropped() {
        let settings = ChargeSettings::default();
        let mut state = ChargeState::from_sample(FuelSample::new(t(70), 0.0, 255.0, None));
        let outcome = process(&mut state, &event(t(30), 0.0, 200.0), &settings);
        assert!(outcome.commands.is_empty());
        assert!(outcome.alerts.is_empty());
        assert_eq!(state.current_data.time, t(70));
    }

    #[test]
    fn rehydration_from_incomplete_charge_starts_charging() {
        let charge = FuelCharge::open(
            Uuid::nil(),
            Uuid::nil(),
            Uuid::nil(),
            &FuelSample::new(t(0), 0.0, 100.0, None),
            &FuelSample::new(t(10), 0.0, 150.0, None),
        );
        let state = ChargeState::from_incomplete_charge(charge);
        assert_eq!(state.state, ChargeFsmState::Charging);
        assert!(state.current_charge.is_some());
    }
}
