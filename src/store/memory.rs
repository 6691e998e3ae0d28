//! # In-memory store.
//!
//! [`MemoryStore`] keeps every table behind one `tokio::sync::Mutex`, which makes
//! each transaction trivially serializable. Writes are applied in place and an undo
//! log restores the previous state when the transaction closure fails or panics.
//!
//! ## Layout
//! ```text
//! rows            HashMap<ClientId, Session>
//! by_position     BTreeMap<(Status, Position), ClientId>
//! by_last_active  BTreeMap<(Status, Timestamp, Position), ClientId>
//! high_water      Option<Position>
//! active_count    Option<u64>
//! ```

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CounterStore, ScanOrder, SessionStore, Store, Transaction};
use crate::clock::Timestamp;
use crate::error::StoreError;
use crate::session::{ClientId, Position, Session, Status};

#[derive(Default)]
struct Tables {
    rows: HashMap<ClientId, Session>,
    by_position: BTreeMap<(Status, Position), ClientId>,
    by_last_active: BTreeMap<(Status, Timestamp, Position), ClientId>,
    high_water: Option<Position>,
    active_count: Option<u64>,
}

impl Tables {
    /// Stores `session`, replacing any row with the same id, and keeps the indexes in step.
    fn put(&mut self, session: Session) -> Option<Session> {
        let prev = self.rows.remove(&session.id);
        if let Some(old) = &prev {
            self.unindex(old);
        }
        self.index(&session);
        self.rows.insert(session.id.clone(), session);
        prev
    }

    fn remove(&mut self, id: &ClientId) -> Option<Session> {
        let old = self.rows.remove(id)?;
        self.unindex(&old);
        Some(old)
    }

    fn index(&mut self, s: &Session) {
        self.by_position.insert((s.status(), s.position), s.id.clone());
        if let Some(at) = s.last_active() {
            self.by_last_active.insert((s.status(), at, s.position), s.id.clone());
        }
    }

    fn unindex(&mut self, s: &Session) {
        self.by_position.remove(&(s.status(), s.position));
        if let Some(at) = s.last_active() {
            self.by_last_active.remove(&(s.status(), at, s.position));
        }
    }

    fn resolve<'a>(
        &self,
        ids: impl Iterator<Item = &'a ClientId>,
    ) -> Result<Vec<Session>, StoreError> {
        ids.map(|id| {
            self.rows.get(id).cloned().ok_or_else(|| StoreError::Corrupted {
                reason: format!("index points at missing row {id}"),
            })
        })
        .collect()
    }
}

/// Inverse of one write, replayed newest-first on rollback.
enum Undo {
    Restore(Session),
    Remove(ClientId),
    HighWater(Option<Position>),
    Counter(Option<u64>),
}

/// Open transaction over the locked tables.
///
/// Dropping it without [`MemoryTx::commit`] replays the undo log, so a closure that
/// returns `Err` or unwinds leaves the tables as they were.
struct MemoryTx<'a> {
    tables: &'a mut Tables,
    undo: Vec<Undo>,
}

impl<'a> MemoryTx<'a> {
    fn begin(tables: &'a mut Tables) -> Self {
        Self {
            tables,
            undo: Vec::new(),
        }
    }

    fn commit(&mut self) {
        self.undo.clear();
    }

    fn rollback(&mut self) {
        let tables = &mut *self.tables;
        for step in self.undo.drain(..).rev() {
            match step {
                Undo::Restore(s) => {
                    tables.put(s);
                }
                Undo::Remove(id) => {
                    tables.remove(&id);
                }
                Undo::HighWater(hw) => tables.high_water = hw,
                Undo::Counter(c) => tables.active_count = c,
            }
        }
    }
}

impl Drop for MemoryTx<'_> {
    fn drop(&mut self) {
        self.rollback();
    }
}

impl SessionStore for MemoryTx<'_> {
    fn session(&self, id: &ClientId) -> Result<Option<Session>, StoreError> {
        Ok(self.tables.rows.get(id).cloned())
    }

    fn scan_by_position(
        &self,
        status: Status,
        order: ScanOrder,
        limit: usize,
    ) -> Result<Vec<Session>, StoreError> {
        let range = self
            .tables
            .by_position
            .range((status, Position::FIRST)..=(status, Position::new(u64::MAX)));
        match order {
            ScanOrder::Ascending => self.tables.resolve(range.map(|(_, id)| id).take(limit)),
            ScanOrder::Descending => self
                .tables
                .resolve(range.rev().map(|(_, id)| id).take(limit)),
        }
    }

    fn scan_by_last_active(
        &self,
        status: Status,
        older_than: Timestamp,
        limit: usize,
    ) -> Result<Vec<Session>, StoreError> {
        let range = self.tables.by_last_active.range(
            (status, Timestamp::EPOCH, Position::FIRST)..(status, older_than, Position::FIRST),
        );
        self.tables.resolve(range.map(|(_, id)| id).take(limit))
    }

    fn last_assigned_position(&self) -> Result<Option<Position>, StoreError> {
        Ok(self.tables.high_water)
    }

    fn insert(&mut self, session: Session) -> Result<(), StoreError> {
        if self.tables.rows.contains_key(&session.id) {
            return Err(StoreError::Corrupted {
                reason: format!("duplicate session {}", session.id),
            });
        }
        if self.tables.high_water.is_some_and(|hw| session.position <= hw) {
            return Err(StoreError::Corrupted {
                reason: format!("position {} already assigned", session.position),
            });
        }
        self.undo.push(Undo::HighWater(self.tables.high_water));
        self.tables.high_water = Some(session.position);
        self.undo.push(Undo::Remove(session.id.clone()));
        self.tables.put(session);
        Ok(())
    }

    fn update(&mut self, session: Session) -> Result<(), StoreError> {
        match self.tables.rows.get(&session.id).map(|s| s.position) {
            None => Err(StoreError::Corrupted {
                reason: format!("update of missing session {}", session.id),
            }),
            Some(position) if position != session.position => Err(StoreError::Corrupted {
                reason: format!("position of session {} is immutable", session.id),
            }),
            Some(_) => {
                if let Some(old) = self.tables.put(session) {
                    self.undo.push(Undo::Restore(old));
                }
                Ok(())
            }
        }
    }

    fn delete(&mut self, id: &ClientId) -> Result<Option<Session>, StoreError> {
        let old = self.tables.remove(id);
        if let Some(s) = &old {
            self.undo.push(Undo::Restore(s.clone()));
        }
        Ok(old)
    }
}

impl CounterStore for MemoryTx<'_> {
    fn active_count(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.tables.active_count)
    }

    fn set_active_count(&mut self, count: u64) -> Result<(), StoreError> {
        self.undo.push(Undo::Counter(self.tables.active_count));
        self.tables.active_count = Some(count);
        Ok(())
    }
}

/// In-process [`Store`] with serializable transactions and rollback.
///
/// ## Example
/// ```rust
/// use waitvisor::{MemoryStore, Position, Session, SessionStore, Store, StoreError};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), StoreError> {
/// let store = MemoryStore::new();
/// store
///     .atomically(|tx| tx.insert(Session::waiting("a".into(), Position::FIRST)))
///     .await?;
/// assert_eq!(store.len().await, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of session rows.
    pub async fn len(&self) -> usize {
        self.tables.lock().await.rows.len()
    }

    /// True if no session rows exist.
    pub async fn is_empty(&self) -> bool {
        self.tables.lock().await.rows.is_empty()
    }

    /// All rows ordered by position.
    pub async fn sessions(&self) -> Vec<Session> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Session> = tables.rows.values().cloned().collect();
        rows.sort_unstable_by_key(|s| s.position);
        rows
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn atomically<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, E> + Send,
        T: Send,
        E: From<StoreError> + Send,
    {
        let mut tables = self.tables.lock().await;
        let mut tx = MemoryTx::begin(&mut tables);
        let res = op(&mut tx);
        if res.is_ok() {
            tx.commit();
        }
        res
    }
}
