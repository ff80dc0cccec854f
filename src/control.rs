// =============================================================================
// Control Plane — Start/Stop/PauseAnalyzer/.../SnapshotStats over a channel
// =============================================================================
//
// Unchanged contract from §4.7: every command is idempotent except
// `ForceClosePosition`, yielding `Ack{correlationId}`/`Error{correlationId,
// reason}`. The command *shapes* and idempotence rules are grounded on
// `api/rest.rs`'s `control_pause`/`control_resume`/`control_kill` handlers
// (flip a mode flag, bump the version counter, log, respond) — the HTTP
// transport those handlers ride on is out of scope (§1 Non-goals), so this
// crate reimplements the same shapes over an in-process
// `tokio::sync::mpsc` request/response channel instead.
// =============================================================================

use crate::types::PositionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControlCommand {
    Start,
    Stop,
    PauseAnalyzer,
    ResumeAnalyzer,
    ForceClosePosition(PositionId),
    SetConfig { section: String, values: Value },
    SnapshotStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControlResponse {
    Ack { correlation_id: Uuid },
    Error { correlation_id: Uuid, reason: String },
    Stats { correlation_id: Uuid, payload: Value },
}

struct Request {
    correlation_id: Uuid,
    command: ControlCommand,
    reply: oneshot::Sender<ControlResponse>,
}

/// Sending half held by callers (API adapters, CLI, tests) issuing commands.
#[derive(Clone)]
pub struct ControlSender {
    tx: mpsc::Sender<Request>,
}

impl ControlSender {
    /// Sends `command` and awaits its response, tagging it with a fresh
    /// correlation id.
    pub async fn send(&self, command: ControlCommand) -> ControlResponse {
        let correlation_id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Request { correlation_id, command, reply: reply_tx }).await.is_err() {
            return ControlResponse::Error { correlation_id, reason: "control_plane_stopped".to_string() };
        }
        reply_rx.await.unwrap_or(ControlResponse::Error { correlation_id, reason: "control_plane_dropped_reply".to_string() })
    }
}

/// Receiving half held by the process wiring in `main.rs`; each received
/// command is handled by invoking the corresponding closure and replying.
pub struct ControlReceiver {
    rx: mpsc::Receiver<Request>,
}

impl ControlReceiver {
    /// Awaits the next command. The caller is responsible for dispatching it
    /// and calling `respond`/`ack`/`error` on the returned `PendingCommand`.
    pub async fn recv(&mut self) -> Option<PendingCommand> {
        self.rx.recv().await.map(|req| PendingCommand {
            correlation_id: req.correlation_id,
            command: req.command,
            reply: req.reply,
        })
    }
}

pub struct PendingCommand {
    pub correlation_id: Uuid,
    pub command: ControlCommand,
    reply: oneshot::Sender<ControlResponse>,
}

impl PendingCommand {
    pub fn ack(self) {
        let _ = self.reply.send(ControlResponse::Ack { correlation_id: self.correlation_id });
    }

    pub fn error(self, reason: impl Into<String>) {
        let _ = self.reply.send(ControlResponse::Error { correlation_id: self.correlation_id, reason: reason.into() });
    }

    pub fn stats(self, payload: Value) {
        let _ = self.reply.send(ControlResponse::Stats { correlation_id: self.correlation_id, payload });
    }
}

pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Builds a connected control-plane channel pair.
pub fn channel() -> (ControlSender, ControlReceiver) {
    let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
    (ControlSender { tx }, ControlReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pause_and_resume_round_trip_through_ack() {
        let (sender, mut receiver) = channel();
        let handler = tokio::spawn(async move {
            let cmd = receiver.recv().await.unwrap();
            assert!(matches!(cmd.command, ControlCommand::PauseAnalyzer));
            cmd.ack();
        });
        let response = sender.send(ControlCommand::PauseAnalyzer).await;
        assert!(matches!(response, ControlResponse::Ack { .. }));
        handler.await.unwrap();
    }

    #[tokio::test]
    async fn force_close_position_carries_its_target_id() {
        let (sender, mut receiver) = channel();
        let target = Uuid::new_v4();
        let handler = tokio::spawn(async move {
            let cmd = receiver.recv().await.unwrap();
            match cmd.command {
                ControlCommand::ForceClosePosition(id) => assert_eq!(id, target),
                other => panic!("unexpected command: {other:?}"),
            }
            cmd.ack();
        });
        let _ = sender.send(ControlCommand::ForceClosePosition(target)).await;
        handler.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_receiver_surfaces_as_error_not_a_panic() {
        let (sender, receiver) = channel();
        drop(receiver);
        let response = sender.send(ControlCommand::SnapshotStats).await;
        assert!(matches!(response, ControlResponse::Error { .. }));
    }
}
