//! Event types and EventBus for Rota
//!
//! Every committed store write is announced as a [`RotaEvent::StoreChanged`]
//! notification. Read-side consumers such as the live personnel view subscribe to the
//! bus instead of polling the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Store table touched by a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreTable {
    Assignments,
    Assets,
    AssetCustody,
    ActivityLogs,
}

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
    /// Committed without touching any row; only echoes the writer's origin
    Noop,
}

/// Identifies one local mutation so its echo notification can be recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MutationToken(pub Uuid);

impl MutationToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MutationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MutationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Change notification published after a write commits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreChange {
    pub table: StoreTable,
    pub op: ChangeOp,
    /// Event the affected rows belong to, when known
    pub event_id: Option<Uuid>,
    /// Primary keys of the affected rows (may be empty for bulk deletes)
    pub ids: Vec<Uuid>,
    /// Token of the local mutation that produced this change, if any
    pub origin: Option<MutationToken>,
    pub timestamp: DateTime<Utc>,
}

impl StoreChange {
    pub fn new(table: StoreTable, op: ChangeOp) -> Self {
        Self {
            table,
            op,
            event_id: None,
            ids: Vec::new(),
            origin: None,
            timestamp: Utc::now(),
        }
    }

    pub fn event(mut self, event_id: Uuid) -> Self {
        self.event_id = Some(event_id);
        self
    }

    pub fn ids(mut self, ids: Vec<Uuid>) -> Self {
        self.ids = ids;
        self
    }

    pub fn origin(mut self, origin: Option<MutationToken>) -> Self {
        self.origin = origin;
        self
    }
}

/// Rota event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RotaEvent {
    /// A store write committed
    StoreChanged(StoreChange),

    /// Auto-assignment reconciled a solver result into the store
    AutoAssignCompleted {
        event_id: Uuid,
        assigned: usize,
        unfilled: usize,
        partial: bool,
        timestamp: DateTime<Utc>,
    },

    /// A kiosk transaction finished (fully or partially)
    KioskTransactionCompleted {
        event_id: Uuid,
        volunteer_id: Uuid,
        action: String,
        steps_applied: usize,
        success: bool,
        timestamp: DateTime<Utc>,
    },

    /// A volunteer is late for a shift
    LateWarning {
        event_id: Uuid,
        assignment_id: Uuid,
        volunteer_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl RotaEvent {
    /// Event type name for SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            RotaEvent::StoreChanged(_) => "StoreChanged",
            RotaEvent::AutoAssignCompleted { .. } => "AutoAssignCompleted",
            RotaEvent::KioskTransactionCompleted { .. } => "KioskTransactionCompleted",
            RotaEvent::LateWarning { .. } => "LateWarning",
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally: publishing never blocks, slow subscribers
/// observe `Lagged` instead of stalling writers.
///
/// # Examples
///
/// ```
/// use rota_common::events::{ChangeOp, EventBus, RotaEvent, StoreChange, StoreTable};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
/// bus.emit_lossy(RotaEvent::StoreChanged(StoreChange::new(
///     StoreTable::Assignments,
///     ChangeOp::Insert,
/// )));
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RotaEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<RotaEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; `Err` when nobody is listening
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: RotaEvent) -> Result<usize, broadcast::error::SendError<RotaEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: RotaEvent) {
        let _ = self.tx.send(event);
    }

    /// Publish a store change notification
    pub fn store_changed(&self, change: StoreChange) {
        tracing::debug!(
            table = ?change.table,
            op = ?change.op,
            rows = change.ids.len(),
            origin = ?change.origin,
            "Store change"
        );
        self.emit_lossy(RotaEvent::StoreChanged(change));
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_errors() {
        let bus = EventBus::new(10);
        let change = StoreChange::new(StoreTable::Assets, ChangeOp::Update);
        assert!(bus.emit(RotaEvent::StoreChanged(change)).is_err());
    }

    #[tokio::test]
    async fn test_store_change_carries_origin() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let token = MutationToken::new();
        let event_id = Uuid::new_v4();

        bus.store_changed(
            StoreChange::new(StoreTable::Assignments, ChangeOp::Update)
                .event(event_id)
                .origin(Some(token)),
        );

        match rx.recv().await.unwrap() {
            RotaEvent::StoreChanged(change) => {
                assert_eq!(change.origin, Some(token));
                assert_eq!(change.event_id, Some(event_id));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = RotaEvent::LateWarning {
            event_id: Uuid::nil(),
            assignment_id: Uuid::nil(),
            volunteer_id: Uuid::nil(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "LateWarning");
        assert_eq!(event.event_type(), "LateWarning");
    }
}
