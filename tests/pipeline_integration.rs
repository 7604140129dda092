//! End-to-end scenarios driven through the full pipeline: catalog lookup,
//! settings resolution, per-key FSM stepping, and emission — rather than
//! calling `engine::charge::process`/`engine::discharge::process` directly
//! as the unit tests alongside those modules do. These are the six
//! scenarios named in the design notes' testable-properties section.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fuel_anomaly_engine::config::catalog::Catalog;
use fuel_anomaly_engine::pipeline::{FullTelemetryEvent, InboundEvent, MpscSource, PipelineDriver};
use fuel_anomaly_engine::storage::{InMemoryChargeStore, InMemoryDischargeStore, InMemorySettingsStore};
use fuel_anomaly_engine::types::{Alert, EngineCommand, TankParameter};
use fuel_anomaly_engine::FuelEventEmitter;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

#[derive(Default)]
struct Recorder {
    commands: Mutex<Vec<EngineCommand>>,
    alerts: Mutex<Vec<Alert>>,
}

#[async_trait]
impl FuelEventEmitter for Recorder {
    async fn emit_command(&self, command: EngineCommand) {
        self.commands.lock().unwrap().push(command);
    }

    async fn emit_alert(&self, alert: Alert) {
        self.alerts.lock().unwrap().push(alert);
    }
}

fn telemetry(object_id: Uuid, time: DateTime<Utc>, volume: f64, speed: f64) -> FullTelemetryEvent {
    let mut params = std::collections::HashMap::new();
    params.insert("fuel_main".to_string(), volume);
    params.insert("speed".to_string(), speed);
    FullTelemetryEvent {
        object_id,
        enterprise_id: Uuid::nil(),
        model_id: Uuid::nil(),
        time,
        receive_time: time,
        location: None,
        params,
    }
}

/// Builds a driver with a single "Main" tank and feeds `samples` through it
/// sequentially, returning the recorded commands/alerts.
async fn run_scenario(samples: &[(i64, f64, f64)]) -> (Vec<EngineCommand>, Vec<Alert>) {
    let tank_id = Uuid::new_v4();
    let object_id = Uuid::new_v4();
    let catalog = Catalog::new(vec![TankParameter { id: tank_id, name: "Main".into(), msg_attr: "fuel_main".into() }]);

    let recorder = Arc::new(Recorder::default());
    let driver = PipelineDriver::new(
        catalog,
        Arc::new(InMemoryChargeStore::default()),
        Arc::new(InMemoryDischargeStore::default()),
        Arc::new(InMemorySettingsStore::default()),
        Arc::clone(&recorder) as Arc<dyn FuelEventEmitter>,
    );
    driver.prime().unwrap();

    let (tx, rx) = tokio::sync::mpsc::channel(samples.len().max(1));
    for &(secs, volume, speed) in samples {
        tx.send(InboundEvent::Telemetry(telemetry(object_id, t(secs), volume, speed))).await.unwrap();
    }
    drop(tx);

    driver.run(MpscSource::new(rx), CancellationToken::new()).await.unwrap();

    let commands = std::mem::take(&mut *recorder.commands.lock().unwrap());
    let alerts = std::mem::take(&mut *recorder.alerts.lock().unwrap());
    (commands, alerts)
}

#[tokio::test]
async fn normal_refuel_begins_updates_and_ends() {
    let (commands, alerts) =
        run_scenario(&[(0, 100.0, 0.0), (10, 120.0, 0.0), (45, 260.0, 0.0), (50, 260.0, 0.0), (60, 255.0, 0.0), (70, 255.0, 0.0)]).await;

    let charge_commands: Vec<_> = commands
        .iter()
        .filter(|c| matches!(c, EngineCommand::BeginFuelCharge(_) | EngineCommand::SetFuelCharge(_) | EngineCommand::EndFuelCharge(_)))
        .collect();
    assert_eq!(charge_commands.len(), 3, "expected begin + update + end, got {charge_commands:?}");
    assert!(matches!(charge_commands[0], EngineCommand::BeginFuelCharge(_)));
    assert!(matches!(charge_commands[1], EngineCommand::SetFuelCharge(_)));
    match charge_commands[2] {
        // begin_state is the sample before the rise (t=0, v=100); end holds
        // at the last Charging->Charging update (t=50, v=260).
        EngineCommand::EndFuelCharge(c) => {
            assert_eq!(c.volume, 160.0);
            assert!(c.is_complete);
        }
        other => panic!("expected EndFuelCharge, got {other:?}"),
    }

    let charge_alerts: Vec<_> = alerts.iter().filter(|a| a.event.starts_with("fuel_charge")).collect();
    assert_eq!(charge_alerts.len(), 2);
    assert_eq!(charge_alerts[0].event, "fuel_charge_begin");
    assert_eq!(charge_alerts[1].event, "fuel_charge_end");
}

#[tokio::test]
async fn sudden_refuel_opens_immediately() {
    let (commands, _alerts) = run_scenario(&[(0, 100.0, 0.0), (200, 400.0, 0.0)]).await;
    let begins: Vec<_> = commands.iter().filter(|c| matches!(c, EngineCommand::BeginFuelCharge(_))).collect();
    assert_eq!(begins.len(), 1);
    match begins[0] {
        EngineCommand::BeginFuelCharge(c) => assert_eq!(c.volume_begin, 100.0),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn false_rise_noise_produces_no_commands() {
    let (commands, alerts) = run_scenario(&[(0, 100.0, 0.0), (5, 160.0, 0.0), (10, 95.0, 0.0)]).await;
    assert!(commands.iter().all(|c| !matches!(c, EngineCommand::BeginFuelCharge(_))));
    assert!(alerts.is_empty());
}

#[tokio::test]
async fn confirmed_discharge_ends_with_alert() {
    // Drives NORM -> MAYBE_DISCHARGING -> DISCHARGING -> EXIT_DISCHARGING and
    // past the 60s verification window with the level still down, so the
    // exit is confirmed as a real discharge.
    let (commands, alerts) = run_scenario(&[
        (0, 500.0, 0.0),
        (5, 499.0, 0.0),
        (10, 300.0, 0.0),
        (15, 250.0, 0.0),
        (20, 245.0, 0.0),
        (55, 240.0, 0.0),
        (90, 240.0, 0.0),
        (120, 240.0, 0.0),
    ])
    .await;

    let discharge_commands: Vec<_> = commands
        .iter()
        .filter(|c| {
            matches!(
                c,
                EngineCommand::BeginFuelDischarge(_) | EngineCommand::SetFuelDischarge(_) | EngineCommand::EndFuelDischarge(_)
            )
        })
        .collect();
    assert!(discharge_commands.iter().any(|c| matches!(c, EngineCommand::BeginFuelDischarge(_))));
    let end = discharge_commands.iter().find(|c| matches!(c, EngineCommand::EndFuelDischarge(_)));
    match end {
        Some(EngineCommand::EndFuelDischarge(d)) => {
            assert_eq!(d.volume_begin, 499.0);
            assert_eq!(d.volume_end, 245.0);
            assert!((d.volume - 254.0).abs() < 1e-9);
        }
        _ => panic!("expected a confirmed EndFuelDischarge, got {discharge_commands:?}"),
    }
    assert!(alerts.iter().any(|a| a.event == "fuel_discharge_end"));
}

#[tokio::test]
async fn false_positive_discharge_is_deleted_without_an_alert() {
    // Same path into EXIT_DISCHARGING, but the level climbs back up before
    // the verification window closes, so the exit is refuted.
    let (commands, alerts) = run_scenario(&[
        (0, 500.0, 0.0),
        (5, 499.0, 0.0),
        (10, 300.0, 0.0),
        (15, 250.0, 0.0),
        (20, 245.0, 0.0),
        (55, 240.0, 0.0),
        (90, 400.0, 0.0),
        (120, 400.0, 0.0),
    ])
    .await;

    assert!(commands.iter().any(|c| matches!(c, EngineCommand::DeleteFuelDischarge { .. })));
    assert!(
        !commands.iter().any(|c| matches!(c, EngineCommand::EndFuelDischarge(_))),
        "a refuted discharge must never also emit an EndFuelDischarge"
    );
    assert!(!alerts.iter().any(|a| a.event == "fuel_discharge_end"), "a refuted discharge carries no confirmation alert");
}

#[tokio::test]
async fn out_of_order_sample_is_dropped_after_a_completed_charge() {
    let (commands, _) =
        run_scenario(&[(0, 100.0, 0.0), (10, 120.0, 0.0), (45, 260.0, 0.0), (50, 260.0, 0.0), (60, 255.0, 0.0), (70, 255.0, 0.0), (30, 200.0, 0.0)])
            .await;

    let ends: Vec<_> = commands.iter().filter(|c| matches!(c, EngineCommand::EndFuelCharge(_))).collect();
    assert_eq!(ends.len(), 1, "the stale t=30 sample must not reopen or re-end the charge");
}
