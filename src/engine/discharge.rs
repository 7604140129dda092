//! Discharge (theft/leak/drain) detection state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::defaults::EXIT_DISCHARGING_DURATION_SECS;
use crate::types::{
    Alert, DischargeSettings, EngineCommand, FuelDataEvent, FuelDischarge, FuelSample, ObjectId,
    OrganizationId,
};

/// Discharge detection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DischargeFsmState {
    Norm,
    MaybeDischarging,
    Discharging,
    ExitDischarging,
}

/// Per-key state for the discharge FSM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DischargeState {
    pub state: DischargeFsmState,
    pub current_data: FuelSample,
    pub state_data: FuelSample,

    pub stop_time_threshold: Option<DateTime<Utc>>,
    pub fuel_volume_threshold: Option<f64>,
    pub begin_move_threshold: Option<DateTime<Utc>>,
    pub check_time_threshold: Option<DateTime<Utc>>,
    pub check_values: Vec<f64>,

    pub current_discharge: Option<FuelDischarge>,
}

impl DischargeState {
    pub fn from_sample(sample: FuelSample) -> Self {
        Self {
            state: DischargeFsmState::Norm,
            current_data: sample,
            state_data: sample,
            stop_time_threshold: None,
            fuel_volume_threshold: None,
            begin_move_threshold: None,
            check_time_threshold: None,
            check_values: Vec::new(),
            current_discharge: None,
        }
    }

    /// Rehydrates mid-operation state from an incomplete stored discharge.
    pub fn from_incomplete_discharge(discharge: FuelDischarge) -> Self {
        let state_data = FuelSample::new(discharge.begin, 0.0, discharge.volume_begin, discharge.location);
        let current_data = FuelSample::new(discharge.end, 0.0, discharge.volume_end, discharge.location);
        Self {
            state: DischargeFsmState::Discharging,
            current_data,
            state_data,
            stop_time_threshold: None,
            fuel_volume_threshold: None,
            begin_move_threshold: None,
            check_time_threshold: None,
            check_values: Vec::new(),
            current_discharge: Some(discharge),
        }
    }

    fn begin_move_threshold_completed(&self, time: DateTime<Utc>) -> bool {
        match self.begin_move_threshold {
            Some(t) => time > t,
            None => true,
        }
    }

    fn stop_time_threshold_completed(&self, time: DateTime<Utc>) -> bool {
        match self.stop_time_threshold {
            Some(t) => time >= t,
            None => true,
        }
    }

    fn fuel_volume_threshold_completed(&self, volume: f64) -> bool {
        match self.fuel_volume_threshold {
            Some(v) => volume <= v,
            None => true,
        }
    }

    fn check_time_threshold_completed(&self, time: DateTime<Utc>) -> bool {
        match self.check_time_threshold {
            Some(t) => time >= t,
            None => true,
        }
    }

    fn check_avg_fuel_volume(&self) -> Option<f64> {
        if self.check_values.is_empty() {
            None
        } else {
            Some(self.check_values.iter().sum::<f64>() / self.check_values.len() as f64)
        }
    }

    /// Verifies whether a tentative discharge is real. An empty
    /// verification buffer is treated as not confirmed.
    fn discharge_is_confirmed(&self, min_volume: f64) -> bool {
        let avg = match self.check_avg_fuel_volume() {
            Some(avg) => avg,
            None => return false,
        };
        let Some(discharge) = self.current_discharge.as_ref() else {
            return false;
        };
        let delta = discharge.volume_begin - avg;
        delta > min_volume && discharge.volume > min_volume
    }
}

#[derive(Debug, Clone, Default)]
pub struct DischargeStepOutcome {
    pub commands: Vec<EngineCommand>,
    pub alerts: Vec<Alert>,
}

impl DischargeStepOutcome {
    fn begin(organization_id: OrganizationId, object_id: ObjectId, tank_name: &str, discharge: FuelDischarge) -> Self {
        let alert = Alert {
            organization_id,
            object_id,
            event: "fuel_discharge_begin",
            create_time: discharge.begin,
            tank_name: tank_name.to_string(),
            volume_begin: discharge.volume_begin,
            volume_end: discharge.volume_end,
            volume: discharge.volume,
            begin_time: discharge.begin,
            end_time: discharge.end,
            text: format!("Possibly started discharging ({tank_name})"),
        };
        Self {
            commands: vec![EngineCommand::BeginFuelDischarge(discharge)],
            alerts: vec![alert],
        }
    }

    fn update(discharge: FuelDischarge) -> Self {
        Self {
            commands: vec![EngineCommand::SetFuelDischarge(discharge)],
            alerts: vec![],
        }
    }

    fn end(organization_id: OrganizationId, object_id: ObjectId, tank_name: &str, discharge: FuelDischarge) -> Self {
        let alert = Alert {
            organization_id,
            object_id,
            event: "fuel_discharge_end",
            create_time: discharge.end,
            tank_name: tank_name.to_string(),
            volume_begin: discharge.volume_begin,
            volume_end: discharge.volume_end,
            volume: discharge.volume,
            begin_time: discharge.begin,
            end_time: discharge.end,
            text: format!("Confirmed fuel discharge ({tank_name})"),
        };
        Self {
            commands: vec![EngineCommand::EndFuelDischarge(discharge)],
            alerts: vec![alert],
        }
    }

    fn cancel(id: crate::types::FuelDischargeId, organization_id: OrganizationId) -> Self {
        Self {
            commands: vec![EngineCommand::DeleteFuelDischarge { id, organization_id }],
            alerts: vec![],
        }
    }
}

/// Pure transition function for discharge detection.
pub fn process(
    state: &mut DischargeState,
    event: &FuelDataEvent,
    settings: &DischargeSettings,
) -> DischargeStepOutcome {
    if event.sample.time < state.current_data.time {
        tracing::warn!(
            object_id = %event.object_id,
            tank_id = %event.tank.id,
            sample_time = %event.sample.time,
            current_time = %state.current_data.time,
            "stale discharge sample dropped"
        );
        return DischargeStepOutcome::default();
    }

    let sample = event.sample.with_fuel_speed(&state.current_data);
    run_move_tracker(state, &sample, settings);

    let (new_fsm_state, outcome) = match state.state {
        DischargeFsmState::Norm => handle_norm(state, event, &sample, settings),
        DischargeFsmState::MaybeDischarging => handle_maybe_discharging(state, event, &sample, settings),
        DischargeFsmState::Discharging => handle_discharging(state, event, &sample, settings),
        DischargeFsmState::ExitDischarging => handle_exit_discharging(state, event, &sample, settings),
    };

    commit(state, &sample, new_fsm_state);
    outcome
}

fn run_move_tracker(state: &mut DischargeState, sample: &FuelSample, settings: &DischargeSettings) {
    if settings.ignore_duration_begin_move_secs > 0 && state.current_data.speed == 0.0 && sample.speed > 0.0 {
        state.begin_move_threshold =
            Some(sample.time + chrono::Duration::seconds(settings.ignore_duration_begin_move_secs));
    }
    if settings.min_stoppage_duration_secs > 0 && state.current_data.speed > 0.0 && sample.speed == 0.0 {
        state.stop_time_threshold =
            Some(sample.time + chrono::Duration::seconds(settings.min_stoppage_duration_secs));
    }
}

fn commit(state: &mut DischargeState, sample: &FuelSample, new_state: DischargeFsmState) {
    if state.state != new_state {
        state.state = new_state;
        state.state_data = state.current_data;
    }
    state.current_data = *sample;
}

fn handle_norm(
    state: &mut DischargeState,
    _event: &FuelDataEvent,
    sample: &FuelSample,
    settings: &DischargeSettings,
) -> (DischargeFsmState, DischargeStepOutcome) {
    if settings.ignore_on_speed && sample.speed > 0.0 {
        return (DischargeFsmState::Norm, DischargeStepOutcome::default());
    }
    if settings.ignore_duration_begin_move_secs > 0 && !state.begin_move_threshold_completed(sample.time) {
        return (DischargeFsmState::Norm, DischargeStepOutcome::default());
    }
    if sample.fuel_speed < 0.0 && sample.fuel_speed.abs() > settings.max_fuel_speed.abs() {
        state.fuel_volume_threshold = Some(state.current_data.fuel_volume - settings.min_volume);
        return (DischargeFsmState::MaybeDischarging, DischargeStepOutcome::default());
    }
    (DischargeFsmState::Norm, DischargeStepOutcome::default())
}

fn handle_maybe_discharging(
    state: &mut DischargeState,
    event: &FuelDataEvent,
    sample: &FuelSample,
    settings: &DischargeSettings,
) -> (DischargeFsmState, DischargeStepOutcome) {
    if settings.ignore_duration_begin_move_secs > 0 && !state.begin_move_threshold_completed(sample.time) {
        return (DischargeFsmState::Norm, DischargeStepOutcome::default());
    }
    if sample.fuel_speed == 0.0 {
        return (DischargeFsmState::MaybeDischarging, DischargeStepOutcome::default());
    }
    if sample.fuel_speed <= 0.0 && sample.fuel_speed.abs() > settings.max_fuel_speed.abs() {
        if state.stop_time_threshold_completed(sample.time) && state.fuel_volume_threshold_completed(sample.fuel_volume)
        {
            let begin_state = state.state_data;
            let discharge =
                FuelDischarge::open(event.organization_id, event.object_id, event.tank.id, &begin_state, sample);
            state.current_discharge = Some(discharge.clone());
            let outcome =
                DischargeStepOutcome::begin(event.organization_id, event.object_id, &event.tank.name, discharge);
            return (DischargeFsmState::Discharging, outcome);
        }
        return (DischargeFsmState::MaybeDischarging, DischargeStepOutcome::default());
    }
    (DischargeFsmState::Norm, DischargeStepOutcome::default())
}

fn handle_discharging(
    state: &mut DischargeState,
    _event: &FuelDataEvent,
    sample: &FuelSample,
    settings: &DischargeSettings,
) -> (DischargeFsmState, DischargeStepOutcome) {
    let continues = sample.fuel_speed == 0.0
        || (sample.fuel_speed < 0.0 && sample.fuel_speed.abs() > settings.max_fuel_speed.abs());

    if continues {
        if let Some(discharge) = state.current_discharge.as_mut() {
            discharge.update_end(sample);
            let outcome = DischargeStepOutcome::update(discharge.clone());
            return (DischargeFsmState::Discharging, outcome);
        }
        return (DischargeFsmState::Discharging, DischargeStepOutcome::default());
    }

    state.check_time_threshold = Some(sample.time + chrono::Duration::seconds(EXIT_DISCHARGING_DURATION_SECS));
    state.check_values.clear();
    (DischargeFsmState::ExitDischarging, DischargeStepOutcome::default())
}

fn handle_exit_discharging(
    state: &mut DischargeState,
    event: &FuelDataEvent,
    sample: &FuelSample,
    settings: &DischargeSettings,
) -> (DischargeFsmState, DischargeStepOutcome) {
    if !state.check_time_threshold_completed(sample.time) {
        let current_end = state.current_discharge.as_ref().map(|d| d.volume_end);
        let resumes = sample.fuel_speed <= 0.0
            && sample.fuel_speed.abs() > settings.max_fuel_speed.abs()
            && current_end.is_some_and(|end| sample.fuel_volume < end);

        if resumes {
            return (DischargeFsmState::Discharging, DischargeStepOutcome::default());
        }
        state.check_values.push(sample.fuel_volume);
        return (DischargeFsmState::ExitDischarging, DischargeStepOutcome::default());
    }

    if state.discharge_is_confirmed(settings.min_volume) {
        if let Some(discharge) = state.current_discharge.as_mut() {
            discharge.close();
            let closed = discharge.clone();
            state.current_discharge = None;
            let outcome =
                DischargeStepOutcome::end(event.organization_id, event.object_id, &event.tank.name, closed);
            return (DischargeFsmState::Norm, outcome);
        }
        (DischargeFsmState::Norm, DischargeStepOutcome::default())
    } else {
        let outcome = match state.current_discharge.take() {
            Some(discharge) => DischargeStepOutcome::cancel(discharge.id, discharge.organization_id),
            None => DischargeStepOutcome::default(),
        };
        (DischargeFsmState::Norm, outcome)
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

    fn settings() -> DischargeSettings {
        DischargeSettings {
            min_volume: 100.0,
            max_fuel_speed: 0.300,
            min_stoppage_duration_secs: 30,
            ignore_on_speed: false,
            ignore_duration_begin_move_secs: 0,
        }
    }

    /// Drives a key through NORM -> MAYBE_DISCHARGING -> DISCHARGING and
    /// leaves it mid-ExitDischarging, with the discharge's last committed
    /// `volume_end` at 245 (set by the `t=20` update). Returns the state so
    /// callers can continue the trace.
    fn primed_exit_discharging_state(settings: &DischargeSettings) -> DischargeState {
        let mut state = DischargeState::from_sample(FuelSample::new(t(0), 0.0, 500.0, None));
        process(&mut state, &event(t(5), 0.0, 499.0), settings); // |fs|=0.2 <= max, stays NORM
        process(&mut state, &event(t(10), 0.0, 300.0), settings); // |fs|=39.8 > max, NORM -> MAYBE_DISCHARGING
        assert_eq!(state.state, DischargeFsmState::MaybeDischarging);

        let begin = process(&mut state, &event(t(15), 0.0, 250.0), settings); // MAYBE_DISCHARGING -> DISCHARGING
        assert_eq!(begin.commands.len(), 1);
        assert!(matches!(begin.commands[0], EngineCommand::BeginFuelDischarge(_)));
        assert_eq!(state.state, DischargeFsmState::Discharging);

        let update = process(&mut state, &event(t(20), 0.0, 245.0), settings); // continues, updates end
        assert_eq!(update.commands.len(), 1);
        assert!(matches!(update.commands[0], EngineCommand::SetFuelDischarge(_)));

        let exit = process(&mut state, &event(t(55), 0.0, 240.0), settings); // |fs| drops below max -> ExitDischarging
        assert!(exit.commands.is_empty());
        assert_eq!(state.state, DischargeFsmState::ExitDischarging);
        assert_eq!(state.check_time_threshold, Some(t(115)));
        state
    }

    #[test]
    fn confirmed_discharge_scenario() {
        let settings = settings();
        let mut state = primed_exit_discharging_state(&settings);

        let buffered = process(&mut state, &event(t(90), 0.0, 240.0), &settings);
        assert!(buffered.commands.is_empty());
        assert_eq!(state.check_values, vec![240.0]);

        let outcome = process(&mut state, &event(t(120), 0.0, 240.0), &settings);
        assert_eq!(outcome.commands.len(), 1);
        match &outcome.commands[0] {
            EngineCommand::EndFuelDischarge(d) => {
                assert_eq!(d.volume_begin, 499.0);
                assert_eq!(d.volume_end, 245.0);
                assert!((d.volume - 254.0).abs() < 1e-9);
                assert!(d.is_complete);
            }
            _ => panic!("expected EndFuelDischarge"),
        }
        assert_eq!(outcome.alerts.len(), 1);
        assert_eq!(state.state, DischargeFsmState::Norm);
    }

    #[test]
    fn false_positive_discharge_scenario() {
        let settings = settings();
        let mut state = primed_exit_discharging_state(&settings);

        let buffered = process(&mut state, &event(t(90), 0.0, 400.0), &settings);
        assert!(buffered.commands.is_empty());
        assert_eq!(state.check_values, vec![400.0]);

        let outcome = process(&mut state, &event(t(120), 0.0, 400.0), &settings);
        assert_eq!(outcome.commands.len(), 1);
        assert!(matches!(outcome.commands[0], EngineCommand::DeleteFuelDischarge { .. }));
        assert!(outcome.alerts.is_empty());
        assert_eq!(state.state, DischargeFsmState::Norm);
        assert!(state.current_discharge.is_none());
    }

    #[test]
    fn empty_check_values_is_not_confirmed() {
        let settings = settings();
        let mut state = primed_exit_discharging_state(&settings);
        // No sample falls inside the verification window before t=115, so
        // check_values is still empty when this sample clears the threshold.
        let outcome = process(&mut state, &event(t(120), 0.0, 240.0), &settings);
        assert!(state.current_discharge.is_none());
        assert_eq!(outcome.commands.len(), 1);
        assert!(matches!(outcome.commands[0], EngineCommand::DeleteFuelDischarge { .. }));
    }

    #[test]
    fn exit_discharging_resumes_when_level_keeps_falling() {
        let settings = settings();
        let mut state = primed_exit_discharging_state(&settings);
        // current_discharge.volume_end == 245; a reading below that while
        // still outside the verification window resumes the discharge.
        let outcome = process(&mut state, &event(t(60), 0.0, 230.0), &settings);
        assert!(outcome.commands.is_empty());
        assert_eq!(state.state, DischargeFsmState::Discharging);
    }

    #[test]
    fn stale_sample_is_dropped() {
        let settings = settings();
        let mut state = DischargeState::from_sample(FuelSample::new(t(70), 0.0, 255.0, None));
        let outcome = process(&mut state, &event(t(30), 0.0, 200.0), &settings);
        assert!(outcome.commands.is_empty());
        assert_eq!(state.current_data.time, t(70));
    }

    #[test]
    fn rehydration_from_incomplete_discharge_starts_discharging() {
        let discharge = FuelDischarge::open(
            Uuid::nil(),
            Uuid::nil(),
            Uuid::nil(),
            &FuelSample::new(t(0), 0.0, 500.0, None),
            &FuelSample::new(t(10), 0.0, 300.0, None),
        );
        let state = DischargeState::from_incomplete_discharge(discharge);
        assert_eq!(state.state, DischargeFsmState::Discharging);
        assert!(state.current_discharge.is_some());
    }
}
