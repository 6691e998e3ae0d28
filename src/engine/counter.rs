//! # Active-slot counter primitive.
//!
//! The counter is an O(1) cache of `count(status = Active)`. It is only ever moved by
//! a signed delta and clamped at zero, so drift left by a partially applied tick
//! shrinks on the next adjustment instead of compounding.

use crate::error::StoreError;
use crate::store::{CounterStore, Transaction};

/// Applies `delta` to the active counter inside `tx` and returns the new value.
///
/// Reads the current value (0 if absent), computes `max(0, current + delta)` and
/// writes it back (insert if absent, else update).
pub(crate) fn apply_delta(tx: &mut dyn Transaction, delta: i64) -> Result<u64, StoreError> {
    let current = tx.active_count()?.unwrap_or(0);
    let next = current.saturating_add_signed(delta);
    tx.set_active_count(next)?;
    Ok(next)
}

/// Reads the active counter inside `tx` (0 if absent).
pub(crate) fn read(tx: &dyn Transaction) -> Result<u64, StoreError> {
    Ok(tx.active_count()?.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Store};

    #[tokio::test]
    async fn test_counter_is_created_lazily_and_clamped() {
        let store = MemoryStore::new();
        let (first, clamped, up) = store
            .atomically(|tx| {
                let before = read(tx)?;
                assert_eq!(before, 0);
                assert_eq!(tx.active_count()?, None);
                let first = apply_delta(tx, 1)?;
                let clamped = apply_delta(tx, -5)?;
                let up = apply_delta(tx, 3)?;
                Ok::<_, StoreError>((first, clamped, up))
            })
            .await
            .unwrap();
        assert_eq!((first, clamped, up), (1, 0, 3));
    }

    #[tokio::test]
    async fn test_extreme_deltas_do_not_overflow() {
        let store = MemoryStore::new();
        let (low, high) = store
            .atomically(|tx| {
                let low = apply_delta(tx, i64::MIN)?;
                let high = apply_delta(tx, i64::MAX)?;
                Ok::<_, StoreError>((low, high))
            })
            .await
            .unwrap();
        assert_eq!(low, 0);
        assert_eq!(high, i64::MAX as u64);
    }
}
