//! In-memory store implementations, used by tests and the replay binary.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::traits::{FuelChargeStore, FuelDischargeStore, FuelSettingsStore, StoreError};
use crate::types::{
    FuelCharge, FuelDischarge, FuelDischargeId, ObjectFuelIntervalSettings, ObjectFuelSettings,
    ObjectId, ObjectModelId, OrganizationId, SettingsBinding, TankParameterId,
};

#[derive(Default)]
pub struct InMemoryChargeStore {
    charges: Mutex<Vec<FuelCharge>>,
}

impl FuelChargeStore for InMemoryChargeStore {
    fn upsert(&self, charge: &FuelCharge) -> Result<(), StoreError> {
        let mut charges = self.charges.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = charges.iter_mut().find(|c| c.id == charge.id) {
            *existing = charge.clone();
        } else {
            charges.push(charge.clone());
        }
        Ok(())
    }

    fn get_last(
        &self,
        object_id: ObjectId,
        tank_id: TankParameterId,
        organization_id: OrganizationId,
    ) -> Result<Option<FuelCharge>, StoreError> {
        let charges = self.charges.lock().unwrap_or_else(|e| e.into_inner());
        Ok(charges
            .iter()
            .filter(|c| c.object_id == object_id && c.tank_id == tank_id && c.organization_id == organization_id)
            .max_by_key(|c| c.begin)
            .cloned())
    }

    fn query(
        &self,
        object_id: ObjectId,
        tank_id: TankParameterId,
        organization_id: OrganizationId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FuelCharge>, StoreError> {
        let charges = self.charges.lock().unwrap_or_else(|e| e.into_inner());
        let mut matches: Vec<FuelCharge> = charges
            .iter()
            .filter(|c| {
                c.object_id == object_id
                    && c.tank_id == tank_id
                    && c.organization_id == organization_id
                    && c.begin >= start
                    && c.begin <= end
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.begin.cmp(&a.begin));
        Ok(matches)
    }
}

#[derive(Default)]
pub struct InMemoryDischargeStore {
    discharges: Mutex<Vec<FuelDischarge>>,
}

impl FuelDischargeStore for InMemoryDischargeStore {
    fn upsert(&self, discharge: &FuelDischarge) -> Result<(), StoreError> {
        let mut discharges = self.discharges.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = discharges.iter_mut().find(|d| d.id == discharge.id) {
            *existing = discharge.clone();
        } else {
            discharges.push(discharge.clone());
        }
        Ok(())
    }

    fn delete(&self, id: FuelDischargeId) -> Result<(), StoreError> {
        let mut discharges = self.discharges.lock().unwrap_or_else(|e| e.into_inner());
        discharges.retain(|d| d.id != id);
        Ok(())
    }

    fn get_last(
        &self,
        object_id: ObjectId,
        tank_id: TankParameterId,
        organization_id: OrganizationId,
    ) -> Result<Option<FuelDischarge>, StoreError> {
        let discharges = self.discharges.lock().unwrap_or_else(|e| e.into_inner());
        Ok(discharges
            .iter()
            .filter(|d| d.object_id == object_id && d.tank_id == tank_id && d.organization_id == organization_id)
            .max_by_key(|d| d.begin)
            .cloned())
    }

    fn query(
        &self,
        object_id: ObjectId,
        tank_id: TankParameterId,
        organization_id: OrganizationId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FuelDischarge>, StoreError> {
        let discharges = self.discharges.lock().unwrap_or_else(|e| e.into_inner());
        let mut matches: Vec<FuelDischarge> = discharges
            .iter()
            .filter(|d| {
                d.object_id == object_id
                    && d.tank_id == tank_id
                    && d.organization_id == organization_id
                    && d.begin >= start
                    && d.begin <= end
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.begin.cmp(&a.begin));
        Ok(matches)
    }
}

/// Settings store backed by two flat vectors, searched linearly. Fine for
/// tests and small replay fixtures; the sled-backed store indexes by key.
#[derive(Default)]
pub struct InMemorySettingsStore {
    permanent: Mutex<Vec<ObjectFuelSettings>>,
    interval: Mutex<Vec<ObjectFuelIntervalSettings>>,
}

impl InMemorySettingsStore {
    pub fn with_permanent(settings: Vec<ObjectFuelSettings>) -> Self {
        Self {
            permanent: Mutex::new(settings),
            interval: Mutex::new(Vec::new()),
        }
    }

    pub fn add_permanent(&self, settings: ObjectFuelSettings) {
        self.permanent.lock().unwrap_or_else(|e| e.into_inner()).push(settings);
    }

    pub fn add_interval(&self, settings: ObjectFuelIntervalSettings) {
        self.interval.lock().unwrap_or_else(|e| e.into_inner()).push(settings);
    }
}

impl FuelSettingsStore for InMemorySettingsStore {
    fn permanent_for_object(
        &self,
        organization_id: OrganizationId,
        tank_id: TankParameterId,
        object_id: ObjectId,
    ) -> Result<Option<ObjectFuelSettings>, StoreError> {
        let permanent = self.permanent.lock().unwrap_or_else(|e| e.into_inner());
        Ok(permanent
            .iter()
            .find(|s| {
                !s.is_deleted()
                    && s.organization_id == organization_id
                    && s.tank_id == tank_id
                    && s.binding == SettingsBinding::Object(object_id)
            })
            .cloned())
    }

    fn permanent_for_model(
        &self,
        organization_id: OrganizationId,
        tank_id: TankParameterId,
        model_id: ObjectModelId,
    ) -> Result<Option<ObjectFuelSettings>, StoreError> {
        let permanent = self.permanent.lock().unwrap_or_else(|e| e.into_inner());
        Ok(permanent
            .iter()
            .find(|s| {
                !s.is_deleted()
                    && s.organization_id == organization_id
                    && s.tank_id == tank_id
                    && s.binding == SettingsBinding::Model(model_id)
            })
            .cloned())
    }

    fn all_interval_settings(&self) -> Result<Vec<ObjectFuelIntervalSettings>, StoreError> {
        Ok(self.interval.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FuelSample;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn charge_store_get_last_picks_latest_begin() {
        let store = InMemoryChargeStore::default();
        let org = Uuid::nil();
        let obj = Uuid::new_v4();
        let tank = Uuid::new_v4();

        let early = FuelCharge::open(org, obj, tank, &FuelSample::new(t(0), 0.0, 100.0, None), &FuelSample::new(t(10), 0.0, 200.0, None));
        let late = FuelCharge::open(org, obj, tank, &FuelSample::new(t(100), 0.0, 100.0, None), &FuelSample::new(t(110), 0.0, 250.0, None));
        store.upsert(&early).unwrap();
        store.upsert(&late).unwrap();

        let last = store.get_last(obj, tank, org).unwrap().unwrap();
        assert_eq!(last.begin, t(100));
    }

    #[test]
    fn discharge_store_delete_removes_record() {
        let store = InMemoryDischargeStore::default();
        let org = Uuid::nil();
        let obj = Uuid::new_v4();
        let tank = Uuid::new_v4();
        let d = FuelDischarge::open(org, obj, tank, &FuelSample::new(t(0), 0.0, 500.0, None), &FuelSample::new(t(10), 0.0, 300.0, None));
        store.upsert(&d).unwrap();
        store.delete(d.id).unwrap();
        assert!(store.get_last(obj, tank, org).unwrap().is_none());
    }
}
