//! Fuel charge/discharge anomaly detection engine.
//!
//! Consumes ordered tank telemetry and runs two independent per-key finite
//! state machines — [`engine::charge`] for refueling, [`engine::discharge`]
//! for theft/leak/drain — emitting lifecycle commands and advisory alerts
//! as operations begin, continue, and end. See `DESIGN.md` for how each
//! module is grounded.
//!
//! ## Architecture
//!
//! - [`types`]: the shared sample/event/record vocabulary.
//! - [`engine`]: the FSMs, the per-key state cache, and the settings
//!   resolver — all I/O-free.
//! - [`storage`]: the persistence traits and their in-memory/sled-backed
//!   implementations.
//! - [`pipeline`]: the driver that wires telemetry consumption, the engine,
//!   and storage/emission together.
//! - [`config`]: startup configuration (tank catalog, storage paths).

pub mod config;
pub mod engine;
pub mod pipeline;
pub mod storage;
pub mod types;

pub use engine::{ChargeStateCache, DischargeStateCache, EngineError, FuelEventEmitter, SettingsResolver};
pub use pipeline::{FullTelemetryEvent, InboundEvent, PipelineDriver, SettingsChangeKind, TelemetrySource};
pub use storage::{FuelChargeStore, FuelDischargeStore, FuelSettingsStore, StoreError};
