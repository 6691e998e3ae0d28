//! # ReconcileDriver: the in-process timer.
//!
//! Calls [`Reconciler::tick`] once per interval until cancelled.
//!
//! ## Event flow
//! ```text
//! DriverStarted
//!   loop {
//!     ├─► token cancelled ──────────────► break
//!     ├─► OS signal (opt-in) ──► ShutdownRequested, cancel token, break
//!     └─► interval tick ──► Reconciler::tick()
//!                             ├─ Ok  ──► (events published by the tick)
//!                             └─ Err ──► TickFailed (already published), warn
//!   }
//! DriverStopped
//! ```
//!
//! ## Rules
//! - The first tick fires one full interval after start.
//! - Missed ticks are delayed, never burst ([`MissedTickBehavior::Delay`]).
//! - A tick in progress always runs to completion; cancellation is observed between ticks.
//! - A failed tick is not retried; the next interval is the retry.

use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::Reconciler;
use super::signals::shutdown_requested;
use crate::events::{Bus, Event, EventKind};
use crate::store::Store;

/// Periodic runner around a [`Reconciler`].
pub struct ReconcileDriver<S> {
    reconciler: Arc<Reconciler<S>>,
    bus: Bus,
    interval: Duration,
    handle_signals: bool,
}

impl<S: Store> ReconcileDriver<S> {
    /// Creates a driver ticking every `interval` (minimum 1 ms).
    pub fn new(reconciler: Arc<Reconciler<S>>, bus: Bus, interval: Duration) -> Self {
        Self {
            reconciler,
            bus,
            interval: interval.max(Duration::from_millis(1)),
            handle_signals: false,
        }
    }

    /// Also stop on SIGINT / SIGTERM / SIGQUIT (Ctrl-C off Unix).
    #[must_use]
    pub fn with_signals(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Runs until `token` is cancelled or, if enabled, a termination signal arrives.
    pub async fn run(self, token: CancellationToken) {
        self.bus.publish(Event::new(EventKind::DriverStarted));

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let signal = shutdown_requested(self.handle_signals);
        tokio::pin!(signal);

        loop {
            select! {
                _ = token.cancelled() => break,
                _ = &mut signal => {
                    self.bus.publish(Event::new(EventKind::ShutdownRequested));
                    token.cancel();
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.reconciler.tick().await {
                        tracing::warn!(error = %e, label = e.as_label(), "reconcile tick failed");
                    }
                }
            }
        }

        self.bus.publish(Event::new(EventKind::DriverStopped));
    }

    /// Spawns [`run`](Self::run) onto the current runtime.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(token))
    }
}
