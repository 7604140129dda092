//! The pipeline driver: consumes inbound events and routes each telemetry
//! sample through both the charge and discharge engines.
//!
//! Grounded on `FuelDischargeService`'s `_start()`/`on_telemetry_event()`
//! (`original_source/service/fuel/run/discharge.py`): for every registered
//! tank parameter named in the event's parameter map, build a
//! `FuelDataEvent` and step that key's FSM; settings-change events just
//! trigger a resolver reload. The teacher's own consumer loop
//! (`pipeline::processor::VibrationProcessor::run`) contributes the
//! `tokio::select!`-over-cancellation-token shape — generalized here from a
//! `tokio::time::timeout` poll to `CancellationToken`, since §5 calls for
//! cooperative cancellation rather than a busy-poll.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::catalog::Catalog;
use crate::engine::cache::{ChargeStateCache, DischargeStateCache};
use crate::engine::charge;
use crate::engine::discharge;
use crate::engine::emitter::FuelEventEmitter;
use crate::engine::settings::SettingsResolver;
use crate::storage::traits::{FuelChargeStore, FuelDischargeStore, FuelSettingsStore};
use crate::types::FuelDataEvent;

use super::source::{FullTelemetryEvent, InboundEvent, SettingsChangeKind, TelemetrySource};

/// Wires the catalog, the two per-key state caches, the settings resolver,
/// and a storage/emitter pair into a single consumer loop.
pub struct PipelineDriver {
    catalog: Catalog,
    charge_store: Arc<dyn FuelChargeStore>,
    discharge_store: Arc<dyn FuelDischargeStore>,
    resolver: SettingsResolver,
    charge_cache: ChargeStateCache,
    discharge_cache: DischargeStateCache,
    emitter: Arc<dyn FuelEventEmitter>,
}

impl PipelineDriver {
    pub fn new(
        catalog: Catalog,
        charge_store: Arc<dyn FuelChargeStore>,
        discharge_store: Arc<dyn FuelDischargeStore>,
        settings_store: Arc<dyn FuelSettingsStore>,
        emitter: Arc<dyn FuelEventEmitter>,
    ) -> Self {
        Self {
            catalog,
            charge_store,
            discharge_store,
            resolver: SettingsResolver::new(settings_store),
            charge_cache: ChargeStateCache::new(),
            discharge_cache: DischargeStateCache::new(),
            emitter,
        }
    }

    /// Loads the settings resolver's maps for the first time. Must be
    /// called once before `run()` — mirrors `FuelDischargeService::
    /// _on_start()` calling `load_settings()` before consuming the bus.
    pub fn prime(&self) -> anyhow::Result<()> {
        self.resolver.reload().map_err(anyhow::Error::from)
    }

    /// Consumes events from `source` until `cancel` fires or the source is
    /// exhausted. Each telemetry event is fanned out to every tank the
    /// catalog names; a settings-change event reloads the resolver.
    pub async fn run(&self, mut source: impl TelemetrySource, cancel: CancellationToken) -> anyhow::Result<()> {
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("pipeline driver cancelled, stopping");
                    return Ok(());
                }
                event = source.recv() => event,
            };

            let Some(event) = event else {
                tracing::info!("telemetry source exhausted, stopping");
                return Ok(());
            };

            match event {
                InboundEvent::Telemetry(telemetry) => self.handle_telemetry(&telemetry).await,
                InboundEvent::SettingsChanged(kind) => self.handle_settings_changed(kind),
            }
        }
    }

    async fn handle_telemetry(&self, telemetry: &FullTelemetryEvent) {
        let speed = telemetry.get_parameter_value("speed", 0.0);

        for tank in self.catalog.tanks() {
            let Some(&fuel_volume) = telemetry.params.get(&tank.msg_attr) else {
                continue;
            };

            let event = FuelDataEvent {
                organization_id: telemetry.enterprise_id,
                object_id: telemetry.object_id,
                model_id: telemetry.model_id,
                tank: tank.clone(),
                sample: crate::types::FuelSample::new(telemetry.time, speed, fuel_volume, telemetry.location),
            };

            self.step_charge(&event).await;
            self.step_discharge(&event).await;
        }
    }

    async fn step_charge(&self, event: &FuelDataEvent) {
        let settings = self
            .resolver
            .resolve(event.organization_id, event.tank.id, event.object_id, event.model_id, event.sample.time)
            .charge;

        let outcome = self.charge_cache.step(event, self.charge_store.as_ref(), |state| {
            charge::process(state, event, &settings)
        });

        match outcome {
            Ok(outcome) => self.emitter.emit_all(outcome.commands, outcome.alerts).await,
            Err(err) => {
                tracing::error!(
                    object_id = %event.object_id,
                    tank_id = %event.tank.id,
                    error = %err,
                    "charge step failed, sample dropped"
                );
            }
        }
    }

    async fn step_discharge(&self, event: &FuelDataEvent) {
        let settings = self
            .resolver
            .resolve(event.organization_id, event.tank.id, event.object_id, event.model_id, event.sample.time)
            .discharge;

        let outcome = self.discharge_cache.step(event, self.discharge_store.as_ref(), |state| {
            discharge::process(state, event, &settings)
        });

        match outcome {
            Ok(outcome) => self.emitter.emit_all(outcome.commands, outcome.alerts).await,
            Err(err) => {
                tracing::error!(
                    object_id = %event.object_id,
                    tank_id = %event.tank.id,
                    error = %err,
                    "discharge step failed, sample dropped"
                );
            }
        }
    }

    fn handle_settings_changed(&self, kind: SettingsChangeKind) {
        tracing::debug!(?kind, "settings change event received, reloading resolver");
        if let Err(err) = self.resolver.reload() {
            tracing::error!(error = %err, "settings resolver reload failed, keeping stale maps");
        }
    }
}
