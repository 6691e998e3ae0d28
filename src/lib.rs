//! # waitvisor
//!
//! **Waitvisor** is admission control for a fixed number of concurrently active
//! clients, with a FIFO waitlist for everybody else.
//!
//! Clients join, prove liveness with heartbeats while admitted, and may signal
//! idleness while waiting. A periodic reconciler evicts clients that stopped
//! signalling and promotes the head of the queue into the freed slots. All state
//! lives in a pluggable transactional [`Store`]; the engine itself owns no data
//! and runs no per-session timers.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   clients ── join / leave / heartbeat ──┐        ┌── session_status / bounds
//!                                         ▼        ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Waitlist (facade)                                                │
//! │  - AdmissionEngine  (state machine, one transaction per call)     │
//! │  - Reconciler       (five atomic steps per tick)                  │
//! │  - StatusQuery      (read-only)                                   │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        │                  │                  │ atomically(|tx| ...)
//!        ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Store: sessions by id / (status, position) / (status, lastActive)│
//! │         + active counter + position high-water mark               │
//! └───────────────────────────────────────────────────────────────────┘
//!
//!   ReconcileDriver ── every reconcile_interval ──► Reconciler::tick()
//!
//!   engine / reconciler / driver ── publish(Event) ──► Bus ──► listener
//!                                                               │
//!                                                        SubscriberSet
//!                                                      ┌────────┼────────┐
//!                                                      ▼        ▼        ▼
//!                                                  LogWriter  sub2     subN
//! ```
//!
//! ### Session lifecycle
//! ```text
//! join ──► capacity free? ──yes──► Active ──heartbeat──► Active
//!              │no                   │ no heartbeat for active_stale_timeout
//!              ▼                     ▼
//!           Waiting ◄──join──┐    evicted (slot freed, head of queue promoted)
//!              │ leave       │
//!              ▼             │
//!      Waiting (idle clock) ─┘
//!              │ idle for waiting_idle_timeout
//!              ▼
//!           evicted
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                          |
//! |-------------------|----------------------------------------------------------|---------------------------------------------|
//! | **Admission**     | Join, leave, heartbeat with idempotent semantics.        | [`AdmissionEngine`], [`JoinOutcome`]        |
//! | **Reconcile**     | Idle/stale eviction, promotion, counter rebalance.       | [`Reconciler`], [`ReconcileDriver`]         |
//! | **Queries**       | Session status and waiting-set bounds.                   | [`StatusQuery`], [`QueueBounds`]            |
//! | **Storage**       | Transactional store contract and in-memory backend.      | [`Store`], [`Transaction`], [`MemoryStore`] |
//! | **Subscriber API**| Observe every committed change and tick outcome.         | [`Subscribe`], [`Event`]                    |
//! | **Errors**        | Typed errors with stable labels.                         | [`WaitlistError`], [`StoreError`]           |
//! | **Configuration** | Capacity, timeouts, intervals; environment loading.      | [`Config`]                                  |
//! | **Time**          | Injected clock for deterministic tests.                  | [`Clock`], [`ManualClock`]                  |
//!
//! ## Optional features
//! - `logging` (default): exports the built-in `LogWriter` subscriber.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use waitvisor::{Config, ManualClock, Status, Timestamp, Waitlist, WaitlistError};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), WaitlistError> {
//!     let clock = Arc::new(ManualClock::new(Timestamp::from_millis(0)));
//!     let waitlist = Waitlist::builder(Config { active_capacity: 2, ..Config::default() })
//!         .with_clock(clock.clone())
//!         .build();
//!
//!     for client in ["a", "b", "c"] {
//!         waitlist.join(client).await?;
//!     }
//!     waitlist.heartbeat("a").await?;
//!     assert!(waitlist.heartbeat("c").await.is_err());
//!
//!     // Only `b` keeps heartbeating.
//!     clock.advance(Duration::from_secs(200));
//!     waitlist.heartbeat("b").await?;
//!     clock.advance(Duration::from_secs(101));
//!
//!     let report = waitlist.reconcile_tick().await?;
//!     assert_eq!(report.promoted, 1);
//!     assert_eq!(waitlist.session_status("a").await?, None);
//!     assert_eq!(waitlist.session_status("c").await?.map(|v| v.status), Some(Status::Active));
//!     Ok(())
//! }
//! ```
mod clock;
mod config;
mod engine;
mod error;
mod events;
mod query;
mod reconciler;
mod session;
mod store;
mod subscribers;
mod waitlist;

// ---- Public re-exports ----

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use config::Config;
pub use engine::{AdmissionEngine, JoinOutcome};
pub use error::{StoreError, WaitlistError};
pub use events::{Bus, Event, EventKind};
pub use query::StatusQuery;
pub use reconciler::{ReconcileDriver, Reconciler, TickReport};
pub use session::{ClientId, Position, QueueBounds, Session, SessionState, SessionView, Status};
pub use store::{CounterStore, MemoryStore, ScanOrder, SessionStore, Store, Transaction};
pub use subscribers::{Subscribe, SubscriberSet};
pub use waitlist::{Waitlist, WaitlistBuilder};

/// Environment variable names read by [`Config::from_env`].
pub mod env {
    pub use crate::config::{
        ENV_ACTIVE_CAPACITY, ENV_ACTIVE_STALE_TIMEOUT, ENV_BUS_CAPACITY, ENV_RECONCILE_INTERVAL,
        ENV_SWEEP_LIMIT, ENV_WAITING_IDLE_TIMEOUT,
    };
}

#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
