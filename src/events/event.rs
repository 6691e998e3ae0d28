//! # Events emitted by the waitlist engine and the reconciler.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Session events**: admission, queueing, idle marking, rejected heartbeats
//! - **Reconcile events**: per-tick eviction, promotion and counter rebalance
//! - **Driver events**: periodic driver start/stop and shutdown
//! - **Subscriber events**: overflow and panics in the fan-out workers
//!
//! The [`Event`] struct carries additional metadata such as the client, its
//! position, a count and a human-readable reason.
//!
//! Events are published only after the owning transaction has committed, so a
//! subscriber never observes a change that was rolled back.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use waitvisor::{Event, EventKind, Position};
//!
//! let ev = Event::new(EventKind::SessionQueued)
//!     .with_client("c-7")
//!     .with_position(Position::new(12));
//!
//! assert_eq!(ev.kind, EventKind::SessionQueued);
//! assert_eq!(ev.client.as_deref(), Some("c-7"));
//! assert_eq!(ev.position, Some(Position::new(12)));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::session::Position;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of waitlist events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Session events ===
    /// New session admitted straight into an active slot.
    ///
    /// Sets: `client`, `position`
    SessionAdmitted,

    /// New session queued because capacity was full.
    ///
    /// Sets: `client`, `position`
    SessionQueued,

    /// Waiting session came back; its idle clock was cleared.
    ///
    /// Sets: `client`, `position`
    SessionResumed,

    /// Waiting session reported going idle; its idle clock started.
    ///
    /// Sets: `client`, `position`
    SessionIdled,

    /// Heartbeat refused because the client holds no active slot.
    ///
    /// Sets: `client`
    HeartbeatRejected,

    /// Active counter written.
    ///
    /// Sets: `count` (new value), `reason` (signed delta)
    CounterAdjusted,

    // === Reconcile events ===
    /// Tick stopped at step 1: nobody is waiting.
    TickSkipped,

    /// Idle waiting sessions deleted.
    ///
    /// Sets: `count`
    IdleEvicted,

    /// Stale active sessions deleted.
    ///
    /// Sets: `count`
    StaleEvicted,

    /// Waiting sessions promoted into freed slots.
    ///
    /// Sets: `count`
    SessionsPromoted,

    /// Tick finished all steps.
    ///
    /// Sets: `count` (active counter after rebalance)
    TickCompleted,

    /// Tick aborted by a store failure.
    ///
    /// Sets: `reason`
    TickFailed,

    // === Driver events ===
    /// Periodic driver started.
    DriverStarted,

    /// Periodic driver exited.
    DriverStopped,

    /// OS termination signal observed by the driver.
    ShutdownRequested,

    // === Subscriber events ===
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `client` (subscriber name), `reason`
    SubscriberOverflow,

    /// Subscriber panicked during event processing.
    ///
    /// Sets: `client` (subscriber name), `reason`
    SubscriberPanicked,
}

impl EventKind {
    /// Short stable label used by log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SessionAdmitted => "session-admitted",
            EventKind::SessionQueued => "session-queued",
            EventKind::SessionResumed => "session-resumed",
            EventKind::SessionIdled => "session-idled",
            EventKind::HeartbeatRejected => "heartbeat-rejected",
            EventKind::CounterAdjusted => "counter-adjusted",
            EventKind::TickSkipped => "tick-skipped",
            EventKind::IdleEvicted => "idle-evicted",
            EventKind::StaleEvicted => "stale-evicted",
            EventKind::SessionsPromoted => "sessions-promoted",
            EventKind::TickCompleted => "tick-completed",
            EventKind::TickFailed => "tick-failed",
            EventKind::DriverStarted => "driver-started",
            EventKind::DriverStopped => "driver-stopped",
            EventKind::ShutdownRequested => "shutdown-requested",
            EventKind::SubscriberOverflow => "subscriber-overflow",
            EventKind::SubscriberPanicked => "subscriber-panicked",
        }
    }
}

/// Waitlist event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Client id (or subscriber name for subscriber events).
    pub client: Option<Arc<str>>,
    /// FIFO position of the client.
    pub position: Option<Position>,
    /// Number of rows affected, or a counter value.
    pub count: Option<u64>,
    /// Human-readable reason (errors, overflow details, deltas).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            client: None,
            position: None,
            count: None,
            reason: None,
        }
    }

    /// Attaches a client id.
    #[inline]
    pub fn with_client(mut self, client: impl Into<Arc<str>>) -> Self {
        self.client = Some(client.into());
        self
    }

    /// Attaches a position.
    #[inline]
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// Attaches a count.
    #[inline]
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_client(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_client(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}
