//! Settings resolution: interval-object → interval-model → permanent-object
//! → permanent-model → built-in defaults.
//!
//! Grounded on `IObjectFuelSettingsStorage`/`IObjectFuelIntervalSettingsStorage`
//! (`original_source/service/fuel/storage/interface.py`), which keep two
//! in-memory maps populated by a `load()` that replays the backing store and
//! fall back through the same four tiers before the caller's own default.
//! Rebuilt wholesale behind a single `ArcSwap` so a reload never exposes a
//! torn read to a concurrent FSM step — the same "rebuild then atomically
//! install" shape `ThresholdManager::load_or_new` uses for its threshold map.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use crate::storage::traits::{FuelSettingsStore, StoreError};
use crate::types::{
    ChargeSettings, DischargeSettings, ObjectId, ObjectModelId, OrganizationId, TankParameterId,
};

type ObjectKey = (OrganizationId, TankParameterId, ObjectId);
type ModelKey = (OrganizationId, TankParameterId, ObjectModelId);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedSettings {
    pub charge: ChargeSettings,
    pub discharge: DischargeSettings,
}

impl Default for ResolvedSettings {
    fn default() -> Self {
        Self { charge: ChargeSettings::default(), discharge: DischargeSettings::default() }
    }
}

/// Resolves `(ChargeSettings, DischargeSettings)` for a sample's
/// `(organization, tank, object, model, time)`.
///
/// The permanent-settings lookup is delegated straight to the backing
/// [`FuelSettingsStore`] (one row per binding, cheap to look up directly).
/// Interval settings are the ones worth caching: a key can carry many
/// interval rows and the resolver is called once per sample, so the two
/// maps below are rebuilt on `load()` and swapped in atomically.
pub struct SettingsResolver {
    store: Arc<dyn FuelSettingsStore>,
    intervals: ArcSwap<IntervalMaps>,
}

#[derive(Default)]
struct IntervalMaps {
    by_object: HashMap<ObjectKey, Vec<crate::types::ObjectFuelIntervalSettings>>,
    by_model: HashMap<ModelKey, Vec<crate::types::ObjectFuelIntervalSettings>>,
}

impl SettingsResolver {
    pub fn new(store: Arc<dyn FuelSettingsStore>) -> Self {
        Self { store, intervals: ArcSwap::from_pointee(IntervalMaps::default()) }
    }

    /// Pulls every interval settings row from the backing store and
    /// installs a freshly rebuilt pair of maps. Called once at startup and
    /// again whenever a settings-change event arrives on the bus.
    pub fn reload(&self) -> Result<(), StoreError> {
        let all = self.store.all_interval_settings()?;
        self.load(all);
        Ok(())
    }

    /// Replays the full interval-settings table into fresh maps and swaps
    /// them in atomically. Called once at startup and again on every
    /// settings-change event (§4.4).
    pub fn load(&self, all_intervals: Vec<crate::types::ObjectFuelIntervalSettings>) {
        let mut maps = IntervalMaps::default();
        for item in all_intervals {
            if item.is_deleted() {
                continue;
            }
            match item.binding {
                crate::types::SettingsBinding::Object(object_id) => {
                    maps.by_object.entry((item.organization_id, item.tank_id, object_id)).or_default().push(item);
                }
                crate::types::SettingsBinding::Model(model_id) => {
                    maps.by_model.entry((item.organization_id, item.tank_id, model_id)).or_default().push(item);
                }
            }
        }
        self.intervals.store(Arc::new(maps));
    }

    /// Resolves settings for a sample, following the five-tier order in
    /// §4.4. Falls back to built-in defaults on a storage error rather than
    /// failing the sample — a missing settings lookup must never stop
    /// detection.
    pub fn resolve(
        &self,
        organization_id: OrganizationId,
        tank_id: TankParameterId,
        object_id: ObjectId,
        model_id: ObjectModelId,
        at: DateTime<Utc>,
    ) -> ResolvedSettings {
        let maps = self.intervals.load();

        if let Some(s) = find_covering(&maps.by_object, &(organization_id, tank_id, object_id), at) {
            return ResolvedSettings { charge: s.charge, discharge: s.discharge };
        }
        if let Some(s) = find_covering(&maps.by_model, &(organization_id, tank_id, model_id), at) {
            return ResolvedSettings { charge: s.charge, discharge: s.discharge };
        }

        match self.store.permanent_for_object(organization_id, tank_id, object_id) {
            Ok(Some(s)) => return ResolvedSettings { charge: s.charge, discharge: s.discharge },
            Ok(None) => {}
            Err(err) => log_lookup_error("permanent_for_object", err),
        }
        match self.store.permanent_for_model(organization_id, tank_id, model_id) {
            Ok(Some(s)) => return ResolvedSettings { charge: s.charge, discharge: s.discharge },
            Ok(None) => {}
            Err(err) => log_lookup_error("permanent_for_model", err),
        }

        ResolvedSettings::default()
    }
}

fn find_covering<'a, K: Eq + std::hash::Hash>(
    map: &'a HashMap<K, Vec<crate::types::ObjectFuelIntervalSettings>>,
    key: &K,
    at: DateTime<Utc>,
) -> Option<&'a crate::types::ObjectFuelIntervalSettings> {
    map.get(key)?.iter().find(|s| !s.is_deleted() && s.covers(at))
}

fn log_lookup_error(op: &str, err: StoreError) {
    tracing::warn!(operation = op, error = %err, "settings lookup failed, falling back to next tier");
}
