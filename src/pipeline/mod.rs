//! Pipeline driver: the only layer that touches a channel, a store, or an
//! emitter. Everything under `crate::engine` is pure; this module is where
//! the I/O lives (§5 of the design notes).

mod driver;
mod source;

pub use driver::PipelineDriver;
pub use source::{FullTelemetryEvent, InboundEvent, MpscSource, SettingsChangeKind, TelemetrySource};
