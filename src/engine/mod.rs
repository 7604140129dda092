//! The detection engine: per-key finite state machines, the settings
//! resolution rule, and the in-memory state cache that rehydrates
//! unfinished operations from storage.
//!
//! Everything under this module is I/O-free. The pipeline driver
//! (`crate::pipeline`) is the only thing that touches a channel, a store, or
//! an emitter; `engine::charge::process` / `engine::discharge::process` are
//! pure functions over `&mut` state.

pub mod cache;
pub mod charge;
pub mod discharge;
pub mod emitter;
pub mod settings;

pub use cache::{ChargeStateCache, DischargeStateCache};
pub use emitter::FuelEventEmitter;
pub use settings::{ResolvedSettings, SettingsResolver};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid settings binding: {0}")]
    InvalidSettings(String),
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StoreError),
}
