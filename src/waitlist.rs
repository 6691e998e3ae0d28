//! # Waitlist: the assembled service.
//!
//! [`Waitlist`] wires one [`Store`], one [`Clock`] and one [`Bus`] into the
//! admission engine, the reconciler and the status query, and forwards every
//! event to the configured subscribers.
//!
//! ## Wiring
//! ```text
//! WaitlistBuilder::build()
//!   ├─ Bus::new(bus_capacity)
//!   ├─ SubscriberSet::new(subscribers, bus)     (one worker per subscriber)
//!   ├─ listener: bus.subscribe() ─► SubscriberSet::emit   (until the Waitlist drops)
//!   ├─ AdmissionEngine (store, clock, bus, active_capacity)
//!   ├─ Reconciler      (store, clock, bus, timeouts, sweep_limit)
//!   └─ StatusQuery     (store)
//! ```
//!
//! ## Example
//! ```rust
//! use waitvisor::{Config, Status, Waitlist};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), waitvisor::WaitlistError> {
//! let waitlist = Waitlist::builder(Config { active_capacity: 1, ..Config::default() }).build();
//!
//! waitlist.join("alice").await?;
//! waitlist.join("bob").await?;
//!
//! let bob = waitlist.session_status("bob").await?.expect("bob joined");
//! assert_eq!(bob.status, Status::Waiting);
//!
//! let bounds = waitlist.global_queue_bounds().await?;
//! assert_eq!(bounds.rank(bob.position), 1);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::engine::{AdmissionEngine, JoinOutcome};
use crate::error::WaitlistError;
use crate::events::Bus;
use crate::query::StatusQuery;
use crate::reconciler::{ReconcileDriver, Reconciler, TickReport};
use crate::session::{ClientId, QueueBounds, SessionView};
use crate::store::{MemoryStore, Store};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for a [`Waitlist`].
pub struct WaitlistBuilder<S = MemoryStore> {
    config: Config,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl WaitlistBuilder<MemoryStore> {
    /// Creates a builder backed by a fresh [`MemoryStore`] and the [`SystemClock`].
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(SystemClock),
            subscribers: Vec::new(),
        }
    }
}

impl<S: Store> WaitlistBuilder<S> {
    /// Uses `store` for all sessions and the active counter.
    pub fn with_store<T: Store>(self, store: Arc<T>) -> WaitlistBuilder<T> {
        WaitlistBuilder {
            config: self.config,
            store,
            clock: self.clock,
            subscribers: self.subscribers,
        }
    }

    /// Uses `clock` for every timestamp.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets event subscribers.
    ///
    /// Each subscriber gets its own worker and bounded queue.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the waitlist.
    ///
    /// Must be called inside a tokio runtime when subscribers are configured.
    pub fn build(self) -> Arc<Waitlist<S>> {
        let bus = Bus::new(self.config.bus_capacity_clamped());
        let token = CancellationToken::new();
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        if !subs.is_empty() {
            subscriber_listener(&bus, Arc::clone(&subs), token.clone());
        }

        let engine = AdmissionEngine::new(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            bus.clone(),
            self.config.active_capacity,
        );
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&self.store),
            self.clock,
            bus.clone(),
            &self.config,
        ));
        let query = StatusQuery::new(Arc::clone(&self.store));

        Arc::new(Waitlist {
            config: self.config,
            bus,
            store: self.store,
            engine,
            reconciler,
            query,
            token,
            _subs: subs,
        })
    }
}

/// Forwards bus events to the subscriber set until `token` is cancelled.
///
/// The set and its workers keep bus senders alive, so the bus never closes on its
/// own; cancellation is the only exit. Events already queued are still delivered.
fn subscriber_listener(bus: &Bus, set: Arc<SubscriberSet>, token: CancellationToken) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    while let Ok(ev) = rx.try_recv() {
                        set.emit(&ev);
                    }
                    break;
                }
                res = rx.recv() => match res {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "subscriber listener lagged behind the bus");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    });
}

/// Admission control with a FIFO waitlist.
///
/// Dropping the last handle stops event forwarding; subscriber workers exit once
/// their queues drain.
pub struct Waitlist<S = MemoryStore> {
    config: Config,
    bus: Bus,
    store: Arc<S>,
    engine: AdmissionEngine<S>,
    reconciler: Arc<Reconciler<S>>,
    query: StatusQuery<S>,
    token: CancellationToken,
    _subs: Arc<SubscriberSet>,
}

impl<S> Drop for Waitlist<S> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl Waitlist<MemoryStore> {
    /// Starts a builder; see [`WaitlistBuilder`].
    pub fn builder(config: Config) -> WaitlistBuilder<MemoryStore> {
        WaitlistBuilder::new(config)
    }
}

impl<S: Store> Waitlist<S> {
    /// Registers or resumes `client`. Idempotent.
    pub async fn join(&self, client: impl Into<ClientId>) -> Result<JoinOutcome, WaitlistError> {
        self.engine.join(&client.into()).await
    }

    /// Marks a waiting `client` idle. No-op for active or unknown clients.
    pub async fn leave(&self, client: impl Into<ClientId>) -> Result<(), WaitlistError> {
        self.engine.leave(&client.into()).await
    }

    /// Refreshes the liveness of an active `client`.
    pub async fn heartbeat(&self, client: impl Into<ClientId>) -> Result<(), WaitlistError> {
        self.engine.heartbeat(&client.into()).await
    }

    /// Status and position of `client`, `None` if unknown.
    pub async fn session_status(
        &self,
        client: impl Into<ClientId>,
    ) -> Result<Option<SessionView>, WaitlistError> {
        self.query.session_status(&client.into()).await
    }

    /// Head and tail positions of the waiting set.
    pub async fn global_queue_bounds(&self) -> Result<QueueBounds, WaitlistError> {
        self.query.global_queue_bounds().await
    }

    /// Runs one reconciliation pass now.
    pub async fn reconcile_tick(&self) -> Result<TickReport, WaitlistError> {
        self.reconciler.tick().await
    }

    /// Driver ticking every `reconcile_interval`, not yet started.
    pub fn reconcile_driver(&self) -> ReconcileDriver<S> {
        ReconcileDriver::new(
            Arc::clone(&self.reconciler),
            self.bus.clone(),
            self.config.reconcile_interval_clamped(),
        )
    }

    /// Spawns the reconcile driver; it stops when `token` is cancelled.
    pub fn spawn_reconciler(&self, token: CancellationToken) -> JoinHandle<()> {
        self.reconcile_driver().spawn(token)
    }

    /// Engine used for client operations.
    pub fn engine(&self) -> &AdmissionEngine<S> {
        &self.engine
    }

    /// Backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Event bus; subscribe to observe events directly.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Effective configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}
