//! # LogWriter: events as `tracing` records
//!
//! A subscriber that renders every [`Event`] as one structured `tracing` record
//! under the `waitvisor` target. Routine session traffic logs at `debug`,
//! reconcile outcomes at `info`, failures at `warn`/`error`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! DEBUG waitvisor: session-admitted client="c-1" position=0
//! DEBUG waitvisor: session-queued client="c-3" position=2
//!  INFO waitvisor: stale-evicted count=1
//!  INFO waitvisor: sessions-promoted count=1
//!  INFO waitvisor: tick-completed active=2
//!  WARN waitvisor: tick-failed reason="store unavailable: down"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let client = e.client.as_deref().unwrap_or("-");
        let position = e.position.map(|p| p.get());
        let reason = e.reason.as_deref().unwrap_or("-");
        let kind = e.kind.as_str();

        match e.kind {
            EventKind::SessionAdmitted
            | EventKind::SessionQueued
            | EventKind::SessionResumed
            | EventKind::SessionIdled => {
                tracing::debug!(target: "waitvisor", seq = e.seq, client, position, "{kind}");
            }
            EventKind::HeartbeatRejected => {
                tracing::debug!(target: "waitvisor", seq = e.seq, client, "{kind}");
            }
            EventKind::CounterAdjusted => {
                tracing::debug!(
                    target: "waitvisor",
                    seq = e.seq,
                    active = e.count,
                    delta = reason,
                    "{kind}"
                );
            }
            EventKind::TickSkipped => {
                tracing::debug!(target: "waitvisor", seq = e.seq, "{kind}");
            }
            EventKind::IdleEvicted | EventKind::StaleEvicted | EventKind::SessionsPromoted => {
                tracing::info!(target: "waitvisor", seq = e.seq, count = e.count, "{kind}");
            }
            EventKind::TickCompleted => {
                tracing::info!(target: "waitvisor", seq = e.seq, active = e.count, "{kind}");
            }
            EventKind::DriverStarted | EventKind::DriverStopped | EventKind::ShutdownRequested => {
                tracing::info!(target: "waitvisor", seq = e.seq, "{kind}");
            }
            EventKind::TickFailed | EventKind::SubscriberOverflow => {
                tracing::warn!(target: "waitvisor", seq = e.seq, client, reason, "{kind}");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(
                    target: "waitvisor",
                    seq = e.seq,
                    subscriber = client,
                    reason,
                    "{kind}"
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
