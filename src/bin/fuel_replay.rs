//! Fuel engine replay harness.
//!
//! Feeds a recorded telemetry file through the full pipeline driver
//! (catalog → settings resolver → per-key FSMs → emitter) and prints a
//! summary, the same role `volve_replay` plays for the drilling pipeline —
//! but the input format here is grounded on `load_telemetry_file`/
//! `make_full_telemetry_event` (`original_source/service/fuel/logic/
//! telemetry.py`): a JSON array of flat objects, each carrying
//! `object_id`/`enterprise_id`/`time` plus arbitrary tank/speed parameters.
//!
//! Usage:
//!   cargo run --bin fuel-replay -- --file telemetry.json

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::Parser;
use fuel_anomaly_engine::config::FuelEngineConfig;
use fuel_anomaly_engine::pipeline::{FullTelemetryEvent, InboundEvent, MpscSource, PipelineDriver};
use fuel_anomaly_engine::storage::{InMemoryChargeStore, InMemoryDischargeStore, InMemorySettingsStore};
use fuel_anomaly_engine::types::{Alert, EngineCommand};
use fuel_anomaly_engine::FuelEventEmitter;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "fuel-replay", about = "Replay recorded telemetry through the fuel anomaly engine")]
struct Args {
    /// Path to a JSON array of telemetry messages.
    #[arg(long, env = "FUEL_REPLAY_FILE")]
    file: PathBuf,

    /// Optional engine config (tank catalog); falls back to the same
    /// search order as `FuelEngineConfig::load()`.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Flat on-disk shape of one telemetry message. Unknown fields — tank
/// `msg_attr`s, `speed` — fall into `params` via `#[serde(flatten)]`,
/// mirroring the Python loader's "everything not a known envelope field"
/// filter.
#[derive(Debug, serde::Deserialize)]
struct RawTelemetryMessage {
    object_id: Uuid,
    enterprise_id: Uuid,
    #[serde(default)]
    model_id: Option<Uuid>,
    time: DateTime<Utc>,
    #[serde(default)]
    receive_time: Option<DateTime<Utc>>,
    #[serde(default)]
    location: Option<[f64; 2]>,
    #[serde(flatten)]
    params: HashMap<String, serde_json::Value>,
}

impl From<RawTelemetryMessage> for FullTelemetryEvent {
    fn from(raw: RawTelemetryMessage) -> Self {
        let params = raw
            .params
            .into_iter()
            .filter_map(|(k, v)| v.as_f64().map(|v| (k, v)))
            .collect();
        FullTelemetryEvent {
            object_id: raw.object_id,
            enterprise_id: raw.enterprise_id,
            model_id: raw.model_id.unwrap_or_else(Uuid::nil),
            time: raw.time,
            receive_time: raw.receive_time.unwrap_or(raw.time),
            location: raw
                .location
                .map(|[lon, lat]| fuel_anomaly_engine::types::Location { lon, lat }),
            params,
        }
    }
}

#[derive(Default)]
struct ReplayStats {
    charges_begun: AtomicU64,
    charges_updated: AtomicU64,
    charges_ended: AtomicU64,
    discharges_begun: AtomicU64,
    discharges_updated: AtomicU64,
    discharges_ended: AtomicU64,
    discharges_deleted: AtomicU64,
    alerts: AtomicU64,
}

/// Emitter that tallies lifecycle commands/alerts instead of forwarding
/// them anywhere — there is nothing downstream in a replay run.
struct CountingEmitter {
    stats: Arc<ReplayStats>,
}

#[async_trait]
impl FuelEventEmitter for CountingEmitter {
    async fn emit_command(&self, command: EngineCommand) {
        match command {
            EngineCommand::BeginFuelCharge(_) => self.stats.charges_begun.fetch_add(1, Ordering::Relaxed),
            EngineCommand::SetFuelCharge(_) => self.stats.charges_updated.fetch_add(1, Ordering::Relaxed),
            EngineCommand::EndFuelCharge(_) => self.stats.charges_ended.fetch_add(1, Ordering::Relaxed),
            EngineCommand::BeginFuelDischarge(_) => self.stats.discharges_begun.fetch_add(1, Ordering::Relaxed),
            EngineCommand::SetFuelDischarge(_) => self.stats.discharges_updated.fetch_add(1, Ordering::Relaxed),
            EngineCommand::EndFuelDischarge(_) => self.stats.discharges_ended.fetch_add(1, Ordering::Relaxed),
            EngineCommand::DeleteFuelDischarge { .. } => self.stats.discharges_deleted.fetch_add(1, Ordering::Relaxed),
        };
    }

    async fn emit_alert(&self, alert: Alert) {
        self.stats.alerts.fetch_add(1, Ordering::Relaxed);
        tracing::info!(event = alert.event, object_id = %alert.object_id, "alert");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => FuelEngineConfig::load_from_file(path).context("loading engine config")?,
        None => FuelEngineConfig::load().context("loading engine config")?,
    };
    let catalog = config.catalog();

    let contents = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading telemetry file {}", args.file.display()))?;
    let messages: Vec<RawTelemetryMessage> =
        serde_json::from_str(&contents).context("parsing telemetry file as a JSON array")?;
    let total = messages.len();
    println!("fuel-replay: loaded {total} telemetry messages from {}", args.file.display());

    let (tx, rx) = tokio::sync::mpsc::channel(total.max(1));
    for message in messages {
        tx.send(InboundEvent::Telemetry(message.into())).await.ok();
    }
    drop(tx);

    let stats = Arc::new(ReplayStats::default());
    let driver = PipelineDriver::new(
        catalog,
        Arc::new(InMemoryChargeStore::default()),
        Arc::new(InMemoryDischargeStore::default()),
        Arc::new(InMemorySettingsStore::default()),
        Arc::new(CountingEmitter { stats: Arc::clone(&stats) }),
    );
    driver.prime().context("priming settings resolver")?;

    driver.run(MpscSource::new(rx), CancellationToken::new()).await?;

    println!();
    println!("fuel-replay: replay complete");
    println!("  messages processed:   {total}");
    println!("  charges begun:        {}", stats.charges_begun.load(Ordering::Relaxed));
    println!("  charges updated:      {}", stats.charges_updated.load(Ordering::Relaxed));
    println!("  charges ended:        {}", stats.charges_ended.load(Ordering::Relaxed));
    println!("  discharges begun:     {}", stats.discharges_begun.load(Ordering::Relaxed));
    println!("  discharges updated:   {}", stats.discharges_updated.load(Ordering::Relaxed));
    println!("  discharges ended:     {}", stats.discharges_ended.load(Ordering::Relaxed));
    println!("  discharges deleted:   {}", stats.discharges_deleted.load(Ordering::Relaxed));
    println!("  alerts emitted:       {}", stats.alerts.load(Ordering::Relaxed));

    Ok(())
}
