//! # Transactional record store contract.
//!
//! The engine never owns data: it reads and writes session rows and the active
//! counter through a [`Store`], one atomic unit per logical operation.
//!
//! ## Contents
//! - [`SessionStore`] point lookup, ordered scans, insert / update / delete of rows
//! - [`CounterStore`] the single active-slot counter
//! - [`Transaction`] both of the above, as seen from inside one atomic unit
//! - [`Store`] runs a closure as an all-or-nothing transaction
//! - [`MemoryStore`] in-process reference implementation
//!
//! ## Indexes a store must provide
//! ```text
//! by id              ClientId                 → Session      (point lookup)
//! by status+position (Status, Position)       → asc / desc scans with limit
//! by status+activity (Status, lastActive)     → asc scan of rows older than a cutoff
//! position ledger    high-water mark of every position ever assigned
//! ```
//!
//! ## Rules
//! - `atomically(op)`: if `op` returns `Err` or panics, none of its writes are visible, ever.
//! - Writes inside one transaction are visible to later reads in the same transaction.
//! - `last_assigned_position` never decreases, even when the tail row is deleted.
//! - Rows whose state carries no timestamp are absent from the activity index.

mod memory;

use async_trait::async_trait;

use crate::clock::Timestamp;
use crate::error::StoreError;
use crate::session::{ClientId, Position, Session, Status};

pub use memory::MemoryStore;

/// Direction of an ordered scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanOrder {
    Ascending,
    Descending,
}

/// Session table operations available inside a transaction.
pub trait SessionStore {
    /// Point lookup by client id.
    fn session(&self, id: &ClientId) -> Result<Option<Session>, StoreError>;

    /// Up to `limit` sessions with `status`, ordered by position.
    fn scan_by_position(
        &self,
        status: Status,
        order: ScanOrder,
        limit: usize,
    ) -> Result<Vec<Session>, StoreError>;

    /// Up to `limit` sessions with `status` whose last-active timestamp is set and
    /// strictly older than `older_than`, oldest first.
    fn scan_by_last_active(
        &self,
        status: Status,
        older_than: Timestamp,
        limit: usize,
    ) -> Result<Vec<Session>, StoreError>;

    /// Highest position ever assigned, `None` if no session was ever inserted.
    fn last_assigned_position(&self) -> Result<Option<Position>, StoreError>;

    /// Inserts a new row. Fails if the id exists or the position is not fresh.
    fn insert(&mut self, session: Session) -> Result<(), StoreError>;

    /// Replaces an existing row. The position must not change.
    fn update(&mut self, session: Session) -> Result<(), StoreError>;

    /// Deletes a row, returning it if it existed.
    fn delete(&mut self, id: &ClientId) -> Result<Option<Session>, StoreError>;
}

/// Active-slot counter operations available inside a transaction.
pub trait CounterStore {
    /// Current counter value, `None` before the first write.
    fn active_count(&self) -> Result<Option<u64>, StoreError>;

    /// Writes the counter (insert if absent, else update).
    fn set_active_count(&mut self, count: u64) -> Result<(), StoreError>;
}

/// Everything a single atomic unit may touch.
pub trait Transaction: SessionStore + CounterStore {}

impl<T: SessionStore + CounterStore + ?Sized> Transaction for T {}

/// Transactional store.
///
/// ### Implementation requirements
/// - `op` runs exactly once per call.
/// - On `Ok`, all writes made by `op` commit together; on `Err` or a panic in `op`,
///   none do.
/// - A commit failure is reported as `StoreError` converted into `E`.
/// - Concurrent calls are serializable with respect to each other.
///
/// ### Synchronous transaction body
/// Only `atomically` is async. `op` and every [`SessionStore`] / [`CounterStore`]
/// call it makes run synchronously, on the runtime worker, while the transaction is
/// open. A backend whose driver is async (sqlx, tokio-postgres) cannot `.await`
/// inside those calls. It has to do one of:
/// - buffer: load what the engine reads up front, record writes in memory and
///   flush them in one round trip after `op` returns `Ok`;
/// - bridge: run blocking queries through `tokio::task::block_in_place` with
///   `Handle::current().block_on(..)`, which needs the multi-thread runtime.
///
/// Either way the transaction must not hold a runtime worker across network I/O
/// longer than one engine operation takes.
///
/// A store that wraps another one only needs to forward the closure:
/// ```rust
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use waitvisor::{CounterStore, MemoryStore, Store, StoreError, Transaction};
///
/// struct Counted {
///     inner: MemoryStore,
///     calls: std::sync::atomic::AtomicU64,
/// }
///
/// #[async_trait]
/// impl Store for Counted {
///     async fn atomically<T, E, F>(&self, op: F) -> Result<T, E>
///     where
///         F: FnOnce(&mut dyn Transaction) -> Result<T, E> + Send,
///         T: Send,
///         E: From<StoreError> + Send,
///     {
///         self.calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
///         self.inner.atomically(op).await
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = Arc::new(Counted {
///     inner: MemoryStore::new(),
///     calls: Default::default(),
/// });
/// let count = store
///     .atomically(|tx| Ok::<_, StoreError>(tx.active_count()?))
///     .await
///     .unwrap();
/// assert_eq!(count, None);
/// assert_eq!(store.calls.load(std::sync::atomic::Ordering::Relaxed), 1);
/// # }
/// ```
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Runs `op` as one all-or-nothing transaction.
    async fn atomically<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, E> + Send,
        T: Send,
        E: From<StoreError> + Send;
}
