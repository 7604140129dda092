//! Outbound sinks for the commands/alerts an FSM step returns.
//!
//! The FSM core never performs I/O (§9 of the design notes): `engine::charge`
//! and `engine::discharge` hand their step outcomes back as plain values, and
//! it is the pipeline driver's job to push them through a `FuelEventEmitter`.
//! This mirrors `storage::PersistenceLayer`'s shape (a `Send + Sync` trait
//! with a pluggable backend) but for publish rather than persist.

use async_trait::async_trait;

use crate::types::{Alert, EngineCommand};

/// Receives the lifecycle commands and alerts produced by a single FSM step.
///
/// Implementations are expected to forward commands to the command/event bus
/// described in §6 and alerts to the alert sink; both are advisory sinks from
/// the engine's point of view — a failure to emit an alert must not roll
/// back a command that already went out (§7: "partial success ... is
/// possible and acceptable").
#[async_trait]
pub trait FuelEventEmitter: Send + Sync {
    async fn emit_command(&self, command: EngineCommand);
    async fn emit_alert(&self, alert: Alert);

    async fn emit_all(&self, commands: Vec<EngineCommand>, alerts: Vec<Alert>) {
        for command in commands {
            self.emit_command(command).await;
        }
        for alert in alerts {
            self.emit_alert(alert).await;
        }
    }
}

/// Emitter that logs every command/alert via `tracing` and otherwise drops
/// it. Useful for the replay binary and for tests that only assert on the
/// FSM's own return values.
#[derive(Debug, Default)]
pub struct LoggingEmitter;

#[async_trait]
impl FuelEventEmitter for LoggingEmitter {
    async fn emit_command(&self, command: EngineCommand) {
        tracing::info!(?command, "engine command emitted");
    }

    async fn emit_alert(&self, alert: Alert) {
        tracing::info!(event = alert.event, text = %alert.text, "alert emitted");
    }
}

/// Emitter that forwards onto `tokio::mpsc` channels, for a driver that
/// wants to hand commands/alerts to a separate persistence/broadcast task
/// rather than do that I/O inline.
pub struct ChannelEmitter {
    commands: tokio::sync::mpsc::Sender<EngineCommand>,
    alerts: tokio::sync::mpsc::Sender<Alert>,
}

impl ChannelEmitter {
    pub fn new(
        commands: tokio::sync::mpsc::Sender<EngineCommand>,
        alerts: tokio::sync::mpsc::Sender<Alert>,
    ) -> Self {
        Self { commands, alerts }
    }
}

#[async_trait]
impl FuelEventEmitter for ChannelEmitter {
    async fn emit_command(&self, command: EngineCommand) {
        if self.commands.send(command).await.is_err() {
            tracing::warn!("command emitter channel closed, dropping command");
        }
    }

    async fn emit_alert(&self, alert: Alert) {
        if self.alerts.send(alert).await.is_err() {
            tracing::warn!("alert emitter channel closed, dropping alert");
        }
    }
}
