//! Assignment Store handle
//!
//! Bundles the SQLite pool with the event bus. Writes run in `sqlx`
//! transactions; the change notifications they produce are collected in a
//! [`ChangeSet`] and published only after the transaction commits.

use rota_common::events::{ChangeOp, EventBus, MutationToken, StoreChange, StoreTable};
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::error::SchedResult;

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    bus: EventBus,
    origin: Option<MutationToken>,
}

impl Store {
    pub fn new(pool: SqlitePool, bus: EventBus) -> Self {
        Self {
            pool,
            bus,
            origin: None,
        }
    }

    /// Copy of this handle whose notifications carry `origin`
    pub fn with_origin(&self, origin: Option<MutationToken>) -> Self {
        Self {
            pool: self.pool.clone(),
            bus: self.bus.clone(),
            origin,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn origin(&self) -> Option<MutationToken> {
        self.origin
    }

    pub async fn begin(&self) -> SchedResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Commit `tx`, then announce `changes`
    pub async fn commit(
        &self,
        tx: Transaction<'static, Sqlite>,
        changes: ChangeSet,
    ) -> SchedResult<()> {
        tx.commit().await?;
        self.publish(changes);
        Ok(())
    }

    /// Announce `changes`; an empty set from a tagged handle still echoes its origin
    pub fn publish(&self, changes: ChangeSet) {
        if changes.is_empty() {
            if let Some(origin) = self.origin {
                self.bus.store_changed(
                    StoreChange::new(StoreTable::Assignments, ChangeOp::Noop).origin(Some(origin)),
                );
            }
            return;
        }
        for change in changes.0 {
            self.bus.store_changed(change.origin(self.origin));
        }
    }
}

/// Notifications pending until a transaction commits
#[derive(Debug, Default)]
pub struct ChangeSet(Vec<StoreChange>);

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, table: StoreTable, op: ChangeOp, event_id: Uuid, ids: Vec<Uuid>) {
        self.0.push(StoreChange::new(table, op).event(event_id).ids(ids));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rota_common::events::RotaEvent;

    #[tokio::test]
    async fn test_commit_publishes_with_origin() {
        let pool = rota_common::db::init_in_memory().await.unwrap();
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let token = MutationToken::new();
        let store = Store::new(pool, bus).with_origin(Some(token));

        let tx = store.begin().await.unwrap();
        let mut changes = ChangeSet::new();
        changes.push(StoreTable::Assets, ChangeOp::Update, Uuid::nil(), vec![Uuid::nil()]);
        store.commit(tx, changes).await.unwrap();

        match rx.recv().await.unwrap() {
            RotaEvent::StoreChanged(change) => {
                assert_eq!(change.origin, Some(token));
                assert_eq!(change.table, StoreTable::Assets);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_commit_echoes_origin_only_when_tagged() {
        let pool = rota_common::db::init_in_memory().await.unwrap();
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let token = MutationToken::new();
        let store = Store::new(pool, bus);

        let tx = store.begin().await.unwrap();
        store.commit(tx, ChangeSet::new()).await.unwrap();
        assert!(rx.try_recv().is_err());

        let tagged = store.with_origin(Some(token));
        let tx = tagged.begin().await.unwrap();
        tagged.commit(tx, ChangeSet::new()).await.unwrap();
        match rx.try_recv().unwrap() {
            RotaEvent::StoreChanged(change) => {
                assert_eq!(change.origin, Some(token));
                assert_eq!(change.op, ChangeOp::Noop);
                assert!(change.ids.is_empty());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_transaction_publishes_nothing() {
        let pool = rota_common::db::init_in_memory().await.unwrap();
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let store = Store::new(pool, bus);

        let tx = store.begin().await.unwrap();
        drop(tx);
        assert!(rx.try_recv().is_err());
    }
}
