//! Best-effort room notifications
//!
//! The engines publish a `RoomEvent` after each committed mutation. Delivery
//! is advisory: a failed publish is logged and never fails or rolls back the
//! operation that triggered it.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use crate::models::RoomStatus;

/// Something observers of the lobby or a room may want to refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    /// A room was created, filled up or left the lobby
    RoomListChanged,
    /// Seats in a room changed
    PlayersChanged { room_id: Uuid },
    /// The room moved to a new phase or chapter
    PhaseChanged {
        room_id: Uuid,
        phase: RoomStatus,
        chapter_order: Option<u32>,
    },
    /// The leader election resolved
    Resolved { room_id: Uuid },
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification failed: {0}")]
    Failed(String),
}

/// Outbound broadcast collaborator
pub trait Notifier: Send + Sync {
    fn publish(&self, event: RoomEvent) -> Result<(), NotifyError>;
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn publish(&self, _event: RoomEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Fans events out to any number of in-process subscribers
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<RoomEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, event: RoomEvent) -> Result<(), NotifyError> {
        // No receivers connected is fine
        let _ = self.tx.send(event);
        Ok(())
    }
}

/// Publish and swallow failures
pub(crate) fn emit(notifier: &dyn Notifier, event: RoomEvent) {
    if let Err(e) = notifier.publish(event.clone()) {
        warn!(?event, error = %e, "Room notification dropped");
    }
}

/// Notifier whose every publish fails
#[cfg(test)]
pub(crate) struct FailingNotifier;

#[cfg(test)]
impl Notifier for FailingNotifier {
    fn publish(&self, _event: RoomEvent) -> Result<(), NotifyError> {
        Err(NotifyError::Failed("socket gone".into()))
    }
}
