//! Inbound event types and the trait standing in for the bus client.
//!
//! Grounded on `FuelDischargeService`'s `_start()` loop
//! (`original_source/service/fuel/run/discharge.py`), which consumes a
//! `FullTelemetryEvent` alongside four settings-change event types off a
//! single bus subscription. A real deployment's bus client lives outside
//! this crate's scope; `TelemetrySource` is the seam it plugs into.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{Location, ObjectId, ObjectModelId, OrganizationId};

/// A single telemetry packet for one asset, carrying every tank's current
/// reading by `msg_attr`.
#[derive(Debug, Clone, PartialEq)]
pub struct FullTelemetryEvent {
    pub object_id: ObjectId,
    pub enterprise_id: OrganizationId,
    pub model_id: ObjectModelId,
    pub time: DateTime<Utc>,
    pub receive_time: DateTime<Utc>,
    pub location: Option<Location>,
    pub params: HashMap<String, f64>,
}

impl FullTelemetryEvent {
    pub fn get_parameter_value(&self, msg_attr: &str, default: f64) -> f64 {
        self.params.get(msg_attr).copied().unwrap_or(default)
    }
}

/// Any of the four settings mutation kinds the driver reacts to by
/// reloading the resolver. The binding/payload detail doesn't matter to the
/// driver — only that a reload is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsChangeKind {
    ObjectFuelSettingsModified,
    ObjectFuelSettingsDeleted,
    ObjectFuelIntervalSettingsModified,
    ObjectFuelIntervalSettingsDeleted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Telemetry(FullTelemetryEvent),
    SettingsChanged(SettingsChangeKind),
}

/// Async source of inbound events. Implementations wrap whatever bus client
/// a deployment uses; `MpscSource` below is the one this crate ships for
/// tests, the replay binary, and minimal deployments.
#[async_trait]
pub trait TelemetrySource: Send {
    async fn recv(&mut self) -> Option<InboundEvent>;
}

/// `TelemetrySource` backed by a `tokio::mpsc` channel.
pub struct MpscSource {
    rx: tokio::sync::mpsc::Receiver<InboundEvent>,
}

impl MpscSource {
    pub fn new(rx: tokio::sync::mpsc::Receiver<InboundEvent>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl TelemetrySource for MpscSource {
    async fn recv(&mut self) -> Option<InboundEvent> {
        self.rx.recv().await
    }
}
