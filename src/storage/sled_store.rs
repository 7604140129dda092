//! Sled-backed persistence for charge/discharge records.
//!
//! Keys are big-endian encoded so sled's natural byte ordering doubles as
//! chronological ordering, the same trick the report history store in this
//! codebase uses. Each `(object_id, tank_id, organization_id)` key gets its
//! own keyspace prefix so `get_last`/`query` can range-scan a single asset
//! without walking the whole tree.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use super::traits::{FuelChargeStore, FuelDischargeStore, StoreError};
use crate::types::{FuelCharge, FuelDischarge, FuelDischargeId, ObjectId, OrganizationId, TankParameterId};

fn prefix(object_id: ObjectId, tank_id: TankParameterId, organization_id: OrganizationId) -> [u8; 48] {
    let mut key = [0u8; 48];
    key[0..16].copy_from_slice(object_id.as_bytes());
    key[16..32].copy_from_slice(tank_id.as_bytes());
    key[32..48].copy_from_slice(organization_id.as_bytes());
    key
}

fn record_key(object_id: ObjectId, tank_id: TankParameterId, organization_id: OrganizationId, begin: DateTime<Utc>) -> Vec<u8> {
    let mut key = prefix(object_id, tank_id, organization_id).to_vec();
    key.extend_from_slice(&(begin.timestamp_millis() as u64).to_be_bytes());
    key
}

fn timestamp_from_suffix(key: &[u8]) -> Option<DateTime<Utc>> {
    let suffix = key.get(48..56)?;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(suffix);
    Utc.timestamp_millis_opt(u64::from_be_bytes(bytes) as i64).single()
}

pub struct SledChargeStore {
    tree: sled::Tree,
}

impl SledChargeStore {
    pub fn open(db: &sled::Db) -> Result<Self, StoreError> {
        let tree = db.open_tree("fuel_charges").map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { tree })
    }
}

impl FuelChargeStore for SledChargeStore {
    fn upsert(&self, charge: &FuelCharge) -> Result<(), StoreError> {
        let key = record_key(charge.object_id, charge.tank_id, charge.organization_id, charge.begin);
        let value = serde_json::to_vec(charge)?;
        self.tree.insert(key, value).map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    fn get_last(
        &self,
        object_id: ObjectId,
        tank_id: TankParameterId,
        organization_id: OrganizationId,
    ) -> Result<Option<FuelCharge>, StoreError> {
        let prefix_bytes = prefix(object_id, tank_id, organization_id);
        let last = self
            .tree
            .scan_prefix(prefix_bytes)
            .rev()
            .next()
            .transpose()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        match last {
            Some((_, value)) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn query(
        &self,
        object_id: ObjectId,
        tank_id: TankParameterId,
        organization_id: OrganizationId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FuelCharge>, StoreError> {
        let prefix_bytes = prefix(object_id, tank_id, organization_id);
        let mut out = Vec::new();
        for item in self.tree.scan_prefix(prefix_bytes).rev() {
            let (key, value) = item.map_err(|e| StoreError::Backend(e.to_string()))?;
            let Some(begin) = timestamp_from_suffix(&key) else { continue };
            if begin >= start && begin <= end {
                out.push(serde_json::from_slice(&value)?);
            }
        }
        Ok(out)
    }
}

pub struct SledDischargeStore {
    tree: sled::Tree,
    /// Secondary index mapping discharge id -> primary key, needed because
    /// `delete` is keyed by id rather than by the (object, tank, org, time)
    /// prefix the primary tree is sorted on.
    by_id: sled::Tree,
}

impl SledDischargeStore {
    pub fn open(db: &sled::Db) -> Result<Self, StoreError> {
        let tree = db.open_tree("fuel_discharges").map_err(|e| StoreError::Backend(e.to_string()))?;
        let by_id = db.open_tree("fuel_discharges_by_id").map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { tree, by_id })
    }
}

impl FuelDischargeStore for SledDischargeStore {
    fn upsert(&self, discharge: &FuelDischarge) -> Result<(), StoreError> {
        let key = record_key(discharge.object_id, discharge.tank_id, discharge.organization_id, discharge.begin);
        let value = serde_json::to_vec(discharge)?;
        self.tree.insert(&key, value).map_err(|e| StoreError::Backend(e.to_string()))?;
        self.by_id
            .insert(discharge.id.as_bytes(), key)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    fn delete(&self, id: FuelDischargeId) -> Result<(), StoreError> {
        if let Some(key) = self
            .by_id
            .remove(id.as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))?
        {
            self.tree.remove(key).map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    fn get_last(
        &self,
        object_id: ObjectId,
        tank_id: TankParameterId,
        organization_id: OrganizationId,
    ) -> Result<Option<FuelDischarge>, StoreError> {
        let prefix_bytes = prefix(object_id, tank_id, organization_id);
        let last = self
            .tree
            .scan_prefix(prefix_bytes)
            .rev()
            .next()
            .transpose()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        match last {
            Some((_, value)) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn query(
        &self,
        object_id: ObjectId,
        tank_id: TankParameterId,
        organization_id: OrganizationId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FuelDischarge>, StoreError> {
        let prefix_bytes = prefix(object_id, tank_id, organization_id);
        let mut out = Vec::new();
        for item in self.tree.scan_prefix(prefix_bytes).rev() {
            let (key, value) = item.map_err(|e| StoreError::Backend(e.to_string()))?;
            let Some(begin) = timestamp_from_suffix(&key) else { continue };
            if begin >= start && begin <= end {
                out.push(serde_json::from_slice(&value)?);
            }
        }
        Ok(out)
    }
}

/// Settings tables are small (one row per binding), so permanent and
/// interval settings are kept in two trees keyed by `org+tank+binding` and
/// scanned linearly rather than range-indexed.
pub struct SledSettingsStore {
    permanent: sled::Tree,
    interval: sled::Tree,
}

fn binding_key(organization_id: OrganizationId, tank_id: TankParameterId, binding: crate::types::SettingsBinding) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(organization_id.as_bytes());
    key.extend_from_slice(tank_id.as_bytes());
    match binding {
        crate::types::SettingsBinding::Object(id) => {
            key.push(0);
            key.extend_from_slice(id.as_bytes());
        }
        crate::types::SettingsBinding::Model(id) => {
            key.push(1);
            key.extend_from_slice(id.as_bytes());
        }
    }
    key
}

impl SledSettingsStore {
    pub fn open(db: &sled::Db) -> Result<Self, StoreError> {
        let permanent = db.open_tree("fuel_settings").map_err(|e| StoreError::Backend(e.to_string()))?;
        let interval = db.open_tree("fuel_interval_settings").map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { permanent, interval })
    }

    pub fn put_permanent(&self, settings: &crate::types::ObjectFuelSettings) -> Result<(), StoreError> {
        let key = binding_key(settings.organization_id, settings.tank_id, settings.binding);
        self.permanent
            .insert(key, serde_json::to_vec(settings)?)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    pub fn put_interval(&self, settings: &crate::types::ObjectFuelIntervalSettings) -> Result<(), StoreError> {
        let mut key = binding_key(settings.organization_id, settings.tank_id, settings.binding);
        key.extend_from_slice(&(settings.begin.timestamp_millis() as u64).to_be_bytes());
        self.interval
            .insert(key, serde_json::to_vec(settings)?)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

impl super::traits::FuelSettingsStore for SledSettingsStore {
    fn permanent_for_object(
        &self,
        organization_id: OrganizationId,
        tank_id: TankParameterId,
        object_id: ObjectId,
    ) -> Result<Option<crate::types::ObjectFuelSettings>, StoreError> {
        let key = binding_key(organization_id, tank_id, crate::types::SettingsBinding::Object(object_id));
        match self.permanent.get(key).map_err(|e| StoreError::Backend(e.to_string()))? {
            Some(value) => {
                let settings: crate::types::ObjectFuelSettings = serde_json::from_slice(&value)?;
                Ok((!settings.is_deleted()).then_some(settings))
            }
            None => Ok(None),
        }
    }

    fn permanent_for_model(
        &self,
        organization_id: OrganizationId,
        tank_id: TankParameterId,
        model_id: crate::types::ObjectModelId,
    ) -> Result<Option<crate::types::ObjectFuelSettings>, StoreError> {
        let key = binding_key(organization_id, tank_id, crate::types::SettingsBinding::Model(model_id));
        match self.permanent.get(key).map_err(|e| StoreError::Backend(e.to_string()))? {
            Some(value) => {
                let settings: crate::types::ObjectFuelSettings = serde_json::from_slice(&value)?;
                Ok((!settings.is_deleted()).then_some(settings))
            }
            None => Ok(None),
        }
    }

    fn all_interval_settings(&self) -> Result<Vec<crate::types::ObjectFuelIntervalSettings>, StoreError> {
        self.interval
            .iter()
            .values()
            .map(|value| {
                let value = value.map_err(|e| StoreError::Backend(e.to_string()))?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect()
    }
}
