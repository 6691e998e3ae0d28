//! # Reconciler: periodic eviction, promotion and counter rebalance.
//!
//! [`Reconciler::tick`] is one reconciliation pass. It detects missing liveness by
//! scanning the activity index, never through per-session timers.
//!
//! ## Steps
//! ```text
//! now = clock.now()                                   (one instant for the whole tick)
//!
//! 1. bounds   waiting head/tail ──► none waiting? ──► TickSkipped, stop
//! 2. idle     Waiting, idle_since < now - waiting_idle_timeout ──► delete (≤ sweep_limit)
//! 3. stale    Active, last_heartbeat < now - active_stale_timeout ──► delete (≤ sweep_limit)
//! 4. promote  first N Waiting by position ──► Active { last_heartbeat: now }, N = step 3 count
//! 5. counter  apply_delta(promoted - evicted_stale)
//! ```
//!
//! ## Rules
//! - Every step is its own atomic unit. A failure aborts the rest of the tick and
//!   leaves earlier steps committed; counter drift is absorbed by the clamp at zero.
//! - Promotion never exceeds the remaining waiting supply.
//! - Overlapping ticks are safe: each one only moves toward the fixed point.
//! - Failures are published as `TickFailed` and returned; there is no retry here.

mod driver;
mod signals;

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, Timestamp};
use crate::config::Config;
use crate::engine::apply_delta;
use crate::error::{StoreError, WaitlistError};
use crate::events::{Bus, Event, EventKind};
use crate::query::waiting_bounds;
use crate::session::{SessionState, Status};
use crate::store::{ScanOrder, SessionStore, Store, Transaction};

pub use driver::ReconcileDriver;

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Span of the waiting set at step 1 (`0` means the tick was skipped).
    pub waiting: u64,
    /// Waiting sessions deleted for idling too long.
    pub evicted_idle: usize,
    /// Active sessions deleted for missing heartbeats.
    pub evicted_stale: usize,
    /// Waiting sessions moved into freed slots.
    pub promoted: usize,
    /// Active counter after rebalance, `None` if the tick was skipped.
    pub active_count: Option<u64>,
}

impl TickReport {
    /// True if the tick stopped at step 1.
    pub fn is_skipped(&self) -> bool {
        self.waiting == 0
    }
}

/// Timer-driven half of the waitlist.
pub struct Reconciler<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    bus: Bus,
    active_stale_timeout: Duration,
    waiting_idle_timeout: Duration,
    sweep_limit: usize,
}

impl<S: Store> Reconciler<S> {
    /// Creates a reconciler using the timeouts and sweep limit from `config`.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, bus: Bus, config: &Config) -> Self {
        Self {
            store,
            clock,
            bus,
            active_stale_timeout: config.active_stale_timeout,
            waiting_idle_timeout: config.waiting_idle_timeout,
            sweep_limit: config.sweep_limit_clamped(),
        }
    }

    /// Runs one reconciliation pass.
    ///
    /// On failure the error is published as `TickFailed` and returned unchanged.
    pub async fn tick(&self) -> Result<TickReport, WaitlistError> {
        let now = self.clock.now();
        match self.run(now).await {
            Ok(report) => Ok(report),
            Err(e) => {
                self.bus.publish(
                    Event::new(EventKind::TickFailed)
                        .with_reason(format!("{}: {e}", e.as_label())),
                );
                Err(e)
            }
        }
    }

    async fn run(&self, now: Timestamp) -> Result<TickReport, WaitlistError> {
        let limit = self.sweep_limit;

        let Some((first, last)) = self.store.atomically(|tx| waiting_bounds(tx)).await? else {
            self.bus.publish(Event::new(EventKind::TickSkipped));
            return Ok(TickReport::default());
        };
        let waiting = last.get().saturating_sub(first.get()).saturating_add(1);

        let idle_cutoff = now.saturating_sub(self.waiting_idle_timeout);
        let evicted_idle = self
            .store
            .atomically(|tx| evict(tx, Status::Waiting, idle_cutoff, limit))
            .await?;
        self.publish_count(EventKind::IdleEvicted, evicted_idle);

        let stale_cutoff = now.saturating_sub(self.active_stale_timeout);
        let evicted_stale = self
            .store
            .atomically(|tx| evict(tx, Status::Active, stale_cutoff, limit))
            .await?;
        self.publish_count(EventKind::StaleEvicted, evicted_stale);

        let promoted = self
            .store
            .atomically(|tx| promote(tx, evicted_stale, now))
            .await?;
        self.publish_count(EventKind::SessionsPromoted, promoted);

        let delta = signed(promoted).saturating_sub(signed(evicted_stale));
        let active = self
            .store
            .atomically(|tx| apply_delta(tx, delta))
            .await?;
        self.bus.publish(
            Event::new(EventKind::CounterAdjusted)
                .with_count(active)
                .with_reason(format!("{delta:+}")),
        );
        self.bus
            .publish(Event::new(EventKind::TickCompleted).with_count(active));

        Ok(TickReport {
            waiting,
            evicted_idle,
            evicted_stale,
            promoted,
            active_count: Some(active),
        })
    }

    fn publish_count(&self, kind: EventKind, count: usize) {
        if count > 0 {
            self.bus.publish(Event::new(kind).with_count(count as u64));
        }
    }
}

/// Deletes up to `limit` sessions with `status` last active before `cutoff`.
fn evict(
    tx: &mut dyn Transaction,
    status: Status,
    cutoff: Timestamp,
    limit: usize,
) -> Result<usize, StoreError> {
    let expired = tx.scan_by_last_active(status, cutoff, limit)?;
    let mut deleted = 0;
    for session in expired {
        if tx.delete(&session.id)?.is_some() {
            deleted += 1;
        }
    }
    Ok(deleted)
}

/// Promotes the `n` earliest waiting sessions.
fn promote(tx: &mut dyn Transaction, n: usize, now: Timestamp) -> Result<usize, StoreError> {
    if n == 0 {
        return Ok(0);
    }
    let head = tx.scan_by_position(Status::Waiting, ScanOrder::Ascending, n)?;
    let promoted = head.len();
    for mut session in head {
        session.state = SessionState::Active {
            last_heartbeat: now,
        };
        tx.update(session)?;
    }
    Ok(promoted)
}

fn signed(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::AdmissionEngine;
    use crate::session::{ClientId, Position, Session};
    use crate::store::{CounterStore, MemoryStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const START: Timestamp = Timestamp::from_millis(1_000_000);

    fn config(capacity: u64) -> Config {
        Config {
            active_capacity: capacity,
            active_stale_timeout: Duration::from_secs(300),
            waiting_idle_timeout: Duration::from_secs(60),
            ..Config::default()
        }
    }

    struct Fixture<S> {
        clock: Arc<ManualClock>,
        engine: AdmissionEngine<S>,
        reconciler: Reconciler<S>,
    }

    fn fixture<S: Store>(store: Arc<S>, config: &Config) -> Fixture<S> {
        let clock = Arc::new(ManualClock::new(START));
        let bus = Bus::new(256);
        Fixture {
            engine: AdmissionEngine::new(
                store.clone(),
                clock.clone(),
                bus.clone(),
                config.active_capacity,
            ),
            reconciler: Reconciler::new(store, clock.clone(), bus, config),
            clock,
        }
    }

    async fn status(store: &impl Store, id: &str) -> Option<Status> {
        let id = ClientId::from(id);
        store
            .atomically(|tx| Ok::<_, StoreError>(tx.session(&id)?.map(|s| s.status())))
            .await
            .unwrap()
    }

    async fn counter(store: &impl Store) -> u64 {
        store
            .atomically(|tx| Ok::<_, StoreError>(tx.active_count()?.unwrap_or(0)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_tick_without_waiting_sessions_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let f = fixture(store.clone(), &config(2));
        f.engine.join(&"a".into()).await.unwrap();
        f.clock.advance(Duration::from_secs(3600));

        let report = f.reconciler.tick().await.unwrap();
        assert!(report.is_skipped());
        assert_eq!(report.active_count, None);
        // Stale actives are only swept while somebody waits.
        assert_eq!(status(&*store, "a").await, Some(Status::Active));
    }

    #[tokio::test]
    async fn test_stale_active_is_replaced_by_head_of_queue() {
        let store = Arc::new(MemoryStore::new());
        let f = fixture(store.clone(), &config(2));
        for id in ["a", "b", "c", "d"] {
            f.engine.join(&id.into()).await.unwrap();
        }

        f.clock.advance(Duration::from_secs(200));
        f.engine.heartbeat(&"b".into()).await.unwrap();
        f.clock.advance(Duration::from_secs(101));

        let report = f.reconciler.tick().await.unwrap();
        assert_eq!(
            report,
            TickReport {
                waiting: 2,
                evicted_idle: 0,
                evicted_stale: 1,
                promoted: 1,
                active_count: Some(2),
            }
        );
        assert_eq!(status(&*store, "a").await, None);
        assert_eq!(status(&*store, "b").await, Some(Status::Active));
        assert_eq!(status(&*store, "c").await, Some(Status::Active));
        assert_eq!(status(&*store, "d").await, Some(Status::Waiting));
        assert_eq!(counter(&*store).await, 2);

        let rows = store.sessions().await;
        let c = rows.iter().find(|s| s.id.as_str() == "c").unwrap();
        assert_eq!(c.last_active(), Some(f.clock.now()));
    }

    #[tokio::test]
    async fn test_promotion_is_bounded_by_waiting_supply() {
        let store = Arc::new(MemoryStore::new());
        let f = fixture(store.clone(), &config(3));
        for id in ["a", "b", "c", "w"] {
            f.engine.join(&id.into()).await.unwrap();
        }
        f.clock.advance(Duration::from_secs(301));

        let report = f.reconciler.tick().await.unwrap();
        assert_eq!(report.evicted_stale, 3);
        assert_eq!(report.promoted, 1);
        assert_eq!(report.active_count, Some(1));
        assert_eq!(counter(&*store).await, 1);
    }

    #[tokio::test]
    async fn test_idle_waiting_is_evicted_before_promotion() {
        let store = Arc::new(MemoryStore::new());
        let f = fixture(store.clone(), &config(1));
        for id in ["a", "idle", "next"] {
            f.engine.join(&id.into()).await.unwrap();
        }
        f.engine.leave(&"idle".into()).await.unwrap();
        f.clock.advance(Duration::from_secs(301));

        let report = f.reconciler.tick().await.unwrap();
        assert_eq!(report.evicted_idle, 1);
        assert_eq!(report.evicted_stale, 1);
        assert_eq!(report.promoted, 1);
        assert_eq!(status(&*store, "idle").await, None);
        assert_eq!(status(&*store, "next").await, Some(Status::Active));
    }

    #[tokio::test]
    async fn test_cutoff_is_strict() {
        let store = Arc::new(MemoryStore::new());
        let f = fixture(store.clone(), &config(0));
        f.engine.join(&"w".into()).await.unwrap();
        f.engine.leave(&"w".into()).await.unwrap();

        f.clock.advance(Duration::from_secs(60));
        f.reconciler.tick().await.unwrap();
        assert_eq!(status(&*store, "w").await, Some(Status::Waiting));

        f.clock.advance(Duration::from_millis(1));
        f.reconciler.tick().await.unwrap();
        assert_eq!(status(&*store, "w").await, None);
    }

    #[tokio::test]
    async fn test_sweep_limit_caps_evictions_per_tick() {
        let store = Arc::new(MemoryStore::new());
        let cfg = Config {
            sweep_limit: 2,
            ..config(0)
        };
        let f = fixture(store.clone(), &cfg);
        for i in 0..5 {
            let id = ClientId::from(format!("w{i}"));
            f.engine.join(&id).await.unwrap();
            f.engine.leave(&id).await.unwrap();
        }
        f.clock.advance(Duration::from_secs(61));

        assert_eq!(f.reconciler.tick().await.unwrap().evicted_idle, 2);
        assert_eq!(f.reconciler.tick().await.unwrap().evicted_idle, 2);
        assert_eq!(f.reconciler.tick().await.unwrap().evicted_idle, 1);
        assert!(f.reconciler.tick().await.unwrap().is_skipped());
    }

    /// Wraps a store and fails the `fail_at`-th transaction.
    struct Flaky {
        inner: MemoryStore,
        calls: AtomicUsize,
        fail_at: usize,
    }

    #[async_trait]
    impl Store for Flaky {
        async fn atomically<T, E, F>(&self, op: F) -> Result<T, E>
        where
            F: FnOnce(&mut dyn Transaction) -> Result<T, E> + Send,
            T: Send,
            E: From<StoreError> + Send,
        {
            if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_at {
                return Err(StoreError::Unavailable {
                    reason: "down".into(),
                }
                .into());
            }
            self.inner.atomically(op).await
        }
    }

    #[tokio::test]
    async fn test_failed_step_keeps_earlier_steps_and_is_published() {
        let cfg = config(1);
        let clock = Arc::new(ManualClock::new(START));
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        // Calls: 0 bounds, 1 idle, 2 stale, 3 promote.
        let flaky = Arc::new(Flaky {
            inner: MemoryStore::new(),
            calls: AtomicUsize::new(0),
            fail_at: 3,
        });
        let reconciler = Reconciler::new(flaky.clone(), clock.clone(), bus, &cfg);
        flaky
            .inner
            .atomically(|tx| {
                tx.insert(Session::active("a".into(), Position::new(0), START))?;
                tx.insert(Session::waiting("w".into(), Position::new(1)))?;
                tx.set_active_count(1)
            })
            .await
            .unwrap();
        clock.advance(Duration::from_secs(301));

        let err = reconciler.tick().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(status(&flaky.inner, "a").await, None);
        assert_eq!(status(&flaky.inner, "w").await, Some(Status::Waiting));
        assert_eq!(counter(&flaky.inner).await, 1);

        let kinds: Vec<EventKind> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, [EventKind::StaleEvicted, EventKind::TickFailed]);

        // Next tick finds nothing stale; the drift stays until the next adjustment.
        let report = reconciler.tick().await.unwrap();
        assert_eq!(report.evicted_stale, 0);
        assert_eq!(report.promoted, 0);
        assert_eq!(report.active_count, Some(1));
    }
}
