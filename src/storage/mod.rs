//! Persistence for charge/discharge records and settings.
//!
//! Two backends ship against the same traits: [`memory`] (an in-memory DAL
//! for tests and minimal deployments, mirroring the teacher's
//! `InMemoryDAL`) and [`sled_store`] (a durable single-instance backend,
//! mirroring the teacher's `HistoryStorage`/`AnalysisStorage`).

pub mod memory;
pub mod sled_store;
pub mod traits;

pub use memory::{InMemoryChargeStore, InMemoryDischargeStore, InMemorySettingsStore};
pub use sled_store::{SledChargeStore, SledDischargeStore, SledSettingsStore};
pub use traits::{FuelChargeStore, FuelDischargeStore, FuelSettingsStore, StoreError};
