//! # Read-only status queries.
//!
//! [`StatusQuery`] answers "where am I?" and "how long is the queue?" without
//! writing anything. Rank and queue length are derived on the caller side through
//! [`QueueBounds::rank`] and [`QueueBounds::span`].

use std::sync::Arc;

use crate::error::{StoreError, WaitlistError};
use crate::session::{ClientId, Position, QueueBounds, SessionView, Status};
use crate::store::{ScanOrder, SessionStore, Store, Transaction};

/// Read side of the waitlist.
pub struct StatusQuery<S> {
    store: Arc<S>,
}

impl<S: Store> StatusQuery<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Status and position of `client`, `None` if it has no session.
    pub async fn session_status(
        &self,
        client: &ClientId,
    ) -> Result<Option<SessionView>, WaitlistError> {
        let view = self
            .store
            .atomically(|tx| -> Result<_, StoreError> {
                Ok(tx.session(client)?.map(|s| SessionView {
                    status: s.status(),
                    position: s.position,
                }))
            })
            .await?;
        Ok(view)
    }

    /// Head and tail positions of the waiting set; `{0, 0}` when nobody waits.
    pub async fn global_queue_bounds(&self) -> Result<QueueBounds, WaitlistError> {
        let bounds = self
            .store
            .atomically(|tx| waiting_bounds(tx))
            .await?
            .map(|(first, last)| QueueBounds::new(first, last))
            .unwrap_or_default();
        Ok(bounds)
    }
}

/// Head and tail of the waiting set inside `tx`.
pub(crate) fn waiting_bounds(
    tx: &dyn Transaction,
) -> Result<Option<(Position, Position)>, StoreError> {
    let head = tx.scan_by_position(Status::Waiting, ScanOrder::Ascending, 1)?;
    let tail = tx.scan_by_position(Status::Waiting, ScanOrder::Descending, 1)?;
    match (head.first(), tail.first()) {
        (Some(h), Some(t)) => Ok(Some((h.position, t.position))),
        _ => Ok(None),
    }
}
