//! # Subscribe: custom reactions to waitlist events.
//!
//! Implement [`Subscribe`] to export queue metrics, notify promoted clients or keep
//! an audit trail, then hand it to
//! [`WaitlistBuilder::with_subscribers`](crate::WaitlistBuilder::with_subscribers).
//!
//! Delivery is at-most-once: a subscriber whose queue is full misses the event and
//! a `SubscriberOverflow` is published in its place.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use async_trait::async_trait;
//! use waitvisor::{Event, EventKind, Subscribe};
//!
//! #[derive(Default)]
//! struct PromotionCounter(AtomicU64);
//!
//! #[async_trait]
//! impl Subscribe for PromotionCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::SessionsPromoted {
//!             self.0.fetch_add(ev.count.unwrap_or(0), Ordering::Relaxed);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "promotion-counter"
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receiver of committed waitlist events.
///
/// Runs on its own worker, so a slow implementation delays nobody but itself.
/// A panic in `on_event` is caught and reported; the worker keeps going.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event. Events arrive in publish order.
    async fn on_event(&self, event: &Event);

    /// Label used in logs and in overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Bound of this subscriber's queue (at least 1 is used). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
