//! Error types used by the waitlist engine and its stores.
//!
//! This module defines two enums:
//!
//! - [`WaitlistError`]: errors returned by engine, reconciler and query operations.
//! - [`StoreError`]: failures of the underlying transactional store.
//!
//! Both provide `as_label` for logs; [`WaitlistError::is_retryable`] tells transports
//! whether a retry can help.

use thiserror::Error;

use crate::session::ClientId;

/// # Errors produced by waitlist operations.
///
/// `NotActive` is the only user-visible failure: the caller acted past its admission
/// window and must rejoin. Everything else is a store failure passed through
/// untouched so the transport can retry it.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WaitlistError {
    /// Heartbeat for a client that has no session or is still waiting.
    #[error("client {client} is not active")]
    NotActive {
        /// The client that attempted the heartbeat.
        client: ClientId,
    },

    /// An atomic unit failed to commit; no partial state was left behind.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WaitlistError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use waitvisor::WaitlistError;
    ///
    /// let err = WaitlistError::NotActive { client: "c-1".into() };
    /// assert_eq!(err.as_label(), "waitlist_not_active");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            WaitlistError::NotActive { .. } => "waitlist_not_active",
            WaitlistError::Store(e) => e.as_label(),
        }
    }

    /// Indicates whether retrying the same call may succeed.
    ///
    /// `NotActive` is never retryable (the client has to join again);
    /// store failures are retryable unless the store reports corruption.
    pub fn is_retryable(&self) -> bool {
        match self {
            WaitlistError::NotActive { .. } => false,
            WaitlistError::Store(e) => e.is_transient(),
        }
    }
}

/// # Errors produced by a [`Store`](crate::Store) implementation.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached or refused the transaction.
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    /// The transaction lost a race and was aborted by the backend.
    #[error("transaction conflict: {reason}")]
    Conflict { reason: String },

    /// A write violated a store invariant (duplicate key, missing row, broken index).
    #[error("store corrupted: {reason}")]
    Corrupted { reason: String },
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::Unavailable { .. } => "store_unavailable",
            StoreError::Conflict { .. } => "store_conflict",
            StoreError::Corrupted { .. } => "store_corrupted",
        }
    }

    /// True for failures that are expected to clear on their own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable { .. } | StoreError::Conflict { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_active_is_not_retryable() {
        let err = WaitlistError::NotActive {
            client: "c".into(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "client c is not active");
    }

    #[test]
    fn test_store_errors_pass_through() {
        let err: WaitlistError = StoreError::Conflict {
            reason: "busy".into(),
        }
        .into();
        assert!(err.is_retryable());
        assert_eq!(err.as_label(), "store_conflict");
        assert_eq!(err.to_string(), "transaction conflict: busy");

        let err: WaitlistError = StoreError::Corrupted {
            reason: "dup".into(),
        }
        .into();
        assert!(!err.is_retryable());
    }
}
