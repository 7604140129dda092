//! Persistence abstraction for charge/discharge records and settings.
//!
//! The engine talks to storage only through these traits, so a replay run
//! can swap in [`InMemoryStore`] while a long-running deployment uses the
//! sled-backed implementation in [`super::sled_store`].

use chrono::{DateTime, Utc};

use crate::types::{
    FuelCharge, FuelChargeId, FuelDischarge, FuelDischargeId, ObjectFuelIntervalSettings,
    ObjectFuelSettings, ObjectId, OrganizationId, TankParameterId,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persists `FuelCharge` records.
pub trait FuelChargeStore: Send + Sync {
    fn upsert(&self, charge: &FuelCharge) -> Result<(), StoreError>;

    /// Most recent charge for a key, open or closed.
    fn get_last(
        &self,
        object_id: ObjectId,
        tank_id: TankParameterId,
        organization_id: OrganizationId,
    ) -> Result<Option<FuelCharge>, StoreError>;

    /// All charges whose `begin` falls within `[start, end]`, newest first.
    fn query(
        &self,
        object_id: ObjectId,
        tank_id: TankParameterId,
        organization_id: OrganizationId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FuelCharge>, StoreError>;
}

/// Persists `FuelDischarge` records.
pub trait FuelDischargeStore: Send + Sync {
    fn upsert(&self, discharge: &FuelDischarge) -> Result<(), StoreError>;

    fn delete(&self, id: FuelDischargeId) -> Result<(), StoreError>;

    fn get_last(
        &self,
        object_id: ObjectId,
        tank_id: TankParameterId,
        organization_id: OrganizationId,
    ) -> Result<Option<FuelDischarge>, StoreError>;

    fn query(
        &self,
        object_id: ObjectId,
        tank_id: TankParameterId,
        organization_id: OrganizationId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FuelDischarge>, StoreError>;
}

/// Resolves permanent and interval settings bindings.
///
/// Lookup order per request, object-id binding first and falling back to
/// the object's model-id binding, is implemented by `engine::settings`
/// against these raw accessors rather than inside the store itself.
pub trait FuelSettingsStore: Send + Sync {
    fn permanent_for_object(
        &self,
        organization_id: OrganizationId,
        tank_id: TankParameterId,
        object_id: ObjectId,
    ) -> Result<Option<ObjectFuelSettings>, StoreError>;

    fn permanent_for_model(
        &self,
        organization_id: OrganizationId,
        tank_id: TankParameterId,
        model_id: crate::types::ObjectModelId,
    ) -> Result<Option<ObjectFuelSettings>, StoreError>;

    /// All interval settings rows, deleted ones included. `engine::settings`
    /// filters and indexes these into its own maps on `load()`; the store
    /// itself keeps no resolved view.
    fn all_interval_settings(&self) -> Result<Vec<ObjectFuelIntervalSettings>, StoreError>;
}
