//! # Admission engine: the session state machine.
//!
//! [`AdmissionEngine`] implements the client-triggered operations. Each call is one
//! atomic unit against the [`Store`]; events are published after it commits.
//!
//! ## Operations
//! ```text
//! join(id)
//!   ├─ row exists
//!   │    ├─ Waiting + idle clock running ─► clear idle clock          (Resumed)
//!   │    ├─ Waiting, engaged             ─► no change                 (AlreadyWaiting)
//!   │    └─ Active                       ─► no change                 (AlreadyActive)
//!   └─ no row
//!        ├─ position = last assigned + 1 (0 for the first ever)
//!        ├─ active counter < capacity    ─► insert Active, counter+1  (Admitted)
//!        └─ otherwise                    ─► insert Waiting            (Queued)
//!
//! leave(id)      Waiting ─► idle_since = now   (Active / unknown: no-op)
//! heartbeat(id)  Active  ─► last_heartbeat = now (anything else: NotActive, no write)
//! ```
//!
//! ## Rules
//! - Re-joining never changes a position; positions are never reused.
//! - `join` never refreshes an active session's liveness; only `heartbeat` does.
//! - Store failures propagate unchanged; there is no retry loop in here.

mod counter;

use std::sync::Arc;

pub(crate) use counter::{apply_delta, read as read_counter};

use crate::clock::Clock;
use crate::error::{StoreError, WaitlistError};
use crate::events::{Bus, Event, EventKind};
use crate::session::{ClientId, Position, Session, SessionState, Status};
use crate::store::{SessionStore, Store};

/// Result of a [`AdmissionEngine::join`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// New session, admitted into an active slot.
    Admitted { position: Position },
    /// New session, queued behind full capacity.
    Queued { position: Position },
    /// Existing waiting session whose idle clock was cleared.
    Resumed { position: Position },
    /// Existing waiting session, nothing to change.
    AlreadyWaiting { position: Position },
    /// Existing active session, nothing to change.
    AlreadyActive { position: Position },
}

impl JoinOutcome {
    /// Position of the session after the call.
    pub fn position(&self) -> Position {
        match *self {
            JoinOutcome::Admitted { position }
            | JoinOutcome::Queued { position }
            | JoinOutcome::Resumed { position }
            | JoinOutcome::AlreadyWaiting { position }
            | JoinOutcome::AlreadyActive { position } => position,
        }
    }

    /// Status of the session after the call.
    pub fn status(&self) -> Status {
        match self {
            JoinOutcome::Admitted { .. } | JoinOutcome::AlreadyActive { .. } => Status::Active,
            JoinOutcome::Queued { .. }
            | JoinOutcome::Resumed { .. }
            | JoinOutcome::AlreadyWaiting { .. } => Status::Waiting,
        }
    }
}

/// Client-facing half of the waitlist: join, leave, heartbeat.
pub struct AdmissionEngine<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    bus: Bus,
    capacity: u64,
}

impl<S: Store> AdmissionEngine<S> {
    /// Creates an engine admitting at most `capacity` clients at once.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, bus: Bus, capacity: u64) -> Self {
        Self {
            store,
            clock,
            bus,
            capacity,
        }
    }

    /// Configured capacity.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Idempotent entry point: called whenever a client begins or resumes participation.
    pub async fn join(&self, client: &ClientId) -> Result<JoinOutcome, WaitlistError> {
        let now = self.clock.now();
        let capacity = self.capacity;

        let (outcome, active) = self
            .store
            .atomically(|tx| -> Result<(JoinOutcome, Option<u64>), StoreError> {
                if let Some(mut session) = tx.session(client)? {
                    let position = session.position;
                    let outcome = match session.state {
                        SessionState::Active { .. } => JoinOutcome::AlreadyActive { position },
                        SessionState::Waiting { idle_since: None } => {
                            JoinOutcome::AlreadyWaiting { position }
                        }
                        SessionState::Waiting { idle_since: Some(_) } => {
                            session.state = SessionState::Waiting { idle_since: None };
                            tx.update(session)?;
                            JoinOutcome::Resumed { position }
                        }
                    };
                    return Ok((outcome, None));
                }

                let position = tx
                    .last_assigned_position()?
                    .map_or(Position::FIRST, Position::next);

                if read_counter(tx)? < capacity {
                    tx.insert(Session::active(client.clone(), position, now))?;
                    let active = apply_delta(tx, 1)?;
                    Ok((JoinOutcome::Admitted { position }, Some(active)))
                } else {
                    tx.insert(Session::waiting(client.clone(), position))?;
                    Ok((JoinOutcome::Queued { position }, None))
                }
            })
            .await?;

        let kind = match outcome {
            JoinOutcome::Admitted { .. } => Some(EventKind::SessionAdmitted),
            JoinOutcome::Queued { .. } => Some(EventKind::SessionQueued),
            JoinOutcome::Resumed { .. } => Some(EventKind::SessionResumed),
            JoinOutcome::AlreadyWaiting { .. } | JoinOutcome::AlreadyActive { .. } => None,
        };
        if let Some(kind) = kind {
            self.bus.publish(
                Event::new(kind)
                    .with_client(client.clone())
                    .with_position(outcome.position()),
            );
        }
        if let Some(active) = active {
            self.publish_counter(active, 1);
        }
        Ok(outcome)
    }

    /// Marks a waiting client idle, starting (or restarting) its idle clock.
    ///
    /// Unknown clients and active clients are left untouched: active sessions
    /// expire through their heartbeat window only.
    pub async fn leave(&self, client: &ClientId) -> Result<(), WaitlistError> {
        let now = self.clock.now();

        let idled = self
            .store
            .atomically(|tx| -> Result<Option<Position>, StoreError> {
                match tx.session(client)? {
                    Some(mut session) if !session.is_active() => {
                        let position = session.position;
                        session.state = SessionState::Waiting {
                            idle_since: Some(now),
                        };
                        tx.update(session)?;
                        Ok(Some(position))
                    }
                    _ => Ok(None),
                }
            })
            .await?;

        if let Some(position) = idled {
            self.bus.publish(
                Event::new(EventKind::SessionIdled)
                    .with_client(client.clone())
                    .with_position(position),
            );
        }
        Ok(())
    }

    /// Liveness proof for an admitted client.
    ///
    /// Fails with [`WaitlistError::NotActive`] and writes nothing if the client has no
    /// session or is still waiting.
    pub async fn heartbeat(&self, client: &ClientId) -> Result<(), WaitlistError> {
        let now = self.clock.now();

        let res = self
            .store
            .atomically(|tx| -> Result<(), WaitlistError> {
                match tx.session(client)? {
                    Some(mut session) if session.is_active() => {
                        session.state = SessionState::Active {
                            last_heartbeat: now,
                        };
                        tx.update(session)?;
                        Ok(())
                    }
                    _ => Err(WaitlistError::NotActive {
                        client: client.clone(),
                    }),
                }
            })
            .await;

        if let Err(WaitlistError::NotActive { .. }) = &res {
            self.bus
                .publish(Event::new(EventKind::HeartbeatRejected).with_client(client.clone()));
        }
        res
    }

    /// Moves the active counter by `delta`, clamped at zero, as its own atomic unit.
    ///
    /// Returns the new counter value.
    pub async fn adjust_active_counter(&self, delta: i64) -> Result<u64, WaitlistError> {
        let active = self
            .store
            .atomically(|tx| apply_delta(tx, delta))
            .await?;
        self.publish_counter(active, delta);
        Ok(active)
    }

    fn publish_counter(&self, active: u64, delta: i64) {
        self.bus.publish(
            Event::new(EventKind::CounterAdjusted)
                .with_count(active)
                .with_reason(format!("{delta:+}")),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, Timestamp};
    use crate::store::MemoryStore;
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        engine: AdmissionEngine<MemoryStore>,
    }

    fn fixture(capacity: u64) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_000)));
        let engine = AdmissionEngine::new(store.clone(), clock.clone(), Bus::new(64), capacity);
        Fixture {
            store,
            clock,
            engine,
        }
    }

    async fn row(store: &MemoryStore, id: &str) -> Option<Session> {
        let id = ClientId::from(id);
        store.atomically(|tx| tx.session(&id)).await.unwrap()
    }

    async fn counter(store: &MemoryStore) -> u64 {
        store.atomically(|tx| read_counter(tx)).await.unwrap()
    }

    #[tokio::test]
    async fn test_join_fills_capacity_then_queues() {
        let f = fixture(2);
        let a = f.engine.join(&"a".into()).await.unwrap();
        let b = f.engine.join(&"b".into()).await.unwrap();
        let c = f.engine.join(&"c".into()).await.unwrap();

        assert_eq!(
            a,
            JoinOutcome::Admitted {
                position: Position::new(0)
            }
        );
        assert_eq!(
            b,
            JoinOutcome::Admitted {
                position: Position::new(1)
            }
        );
        assert_eq!(
            c,
            JoinOutcome::Queued {
                position: Position::new(2)
            }
        );
        assert_eq!(counter(&f.store).await, 2);
        assert_eq!(
            row(&f.store, "a").await.unwrap().state,
            SessionState::Active {
                last_heartbeat: Timestamp::from_millis(1_000)
            }
        );
        assert_eq!(
            row(&f.store, "c").await.unwrap().state,
            SessionState::Waiting { idle_since: None }
        );
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let f = fixture(1);
        f.engine.join(&"a".into()).await.unwrap();
        f.engine.join(&"b".into()).await.unwrap();
        f.clock.advance(Duration::from_secs(10));

        let again_a = f.engine.join(&"a".into()).await.unwrap();
        let again_b = f.engine.join(&"b".into()).await.unwrap();
        assert_eq!(
            again_a,
            JoinOutcome::AlreadyActive {
                position: Position::new(0)
            }
        );
        assert_eq!(
            again_b,
            JoinOutcome::AlreadyWaiting {
                position: Position::new(1)
            }
        );
        assert_eq!(counter(&f.store).await, 1);

        // Liveness is not refreshed by join.
        assert_eq!(
            row(&f.store, "a").await.unwrap().last_active(),
            Some(Timestamp::from_millis(1_000))
        );
    }

    #[tokio::test]
    async fn test_positions_are_not_reused_after_delete() {
        let f = fixture(0);
        f.engine.join(&"a".into()).await.unwrap();
        f.engine.join(&"b".into()).await.unwrap();
        f.store
            .atomically(|tx| tx.delete(&"b".into()))
            .await
            .unwrap();

        let c = f.engine.join(&"c".into()).await.unwrap();
        assert_eq!(c.position(), Position::new(2));
        let b = f.engine.join(&"b".into()).await.unwrap();
        assert_eq!(b.position(), Position::new(3));
    }

    #[tokio::test]
    async fn test_leave_then_join_resumes_waiting_session() {
        let f = fixture(0);
        f.engine.join(&"w".into()).await.unwrap();

        f.engine.leave(&"w".into()).await.unwrap();
        assert_eq!(
            row(&f.store, "w").await.unwrap().state,
            SessionState::Waiting {
                idle_since: Some(Timestamp::from_millis(1_000))
            }
        );

        f.clock.advance(Duration::from_secs(5));
        f.engine.leave(&"w".into()).await.unwrap();
        assert_eq!(
            row(&f.store, "w").await.unwrap().last_active(),
            Some(Timestamp::from_millis(6_000))
        );

        let resumed = f.engine.join(&"w".into()).await.unwrap();
        assert_eq!(
            resumed,
            JoinOutcome::Resumed {
                position: Position::new(0)
            }
        );
        assert_eq!(row(&f.store, "w").await.unwrap().last_active(), None);
    }

    #[tokio::test]
    async fn test_leave_ignores_active_and_unknown() {
        let f = fixture(1);
        f.engine.join(&"a".into()).await.unwrap();
        f.clock.advance(Duration::from_secs(30));

        f.engine.leave(&"a".into()).await.unwrap();
        f.engine.leave(&"ghost".into()).await.unwrap();

        assert_eq!(
            row(&f.store, "a").await.unwrap().last_active(),
            Some(Timestamp::from_millis(1_000))
        );
        assert!(row(&f.store, "ghost").await.is_none());
    }

    #[tokio::test]
    async fn test_heartbeat_refreshes_active_only() {
        let f = fixture(1);
        f.engine.join(&"a".into()).await.unwrap();
        f.engine.join(&"w".into()).await.unwrap();
        f.clock.advance(Duration::from_secs(3));

        f.engine.heartbeat(&"a".into()).await.unwrap();
        assert_eq!(
            row(&f.store, "a").await.unwrap().last_active(),
            Some(Timestamp::from_millis(4_000))
        );

        let before = f.store.sessions().await;
        let waiting = f.engine.heartbeat(&"w".into()).await;
        let unknown = f.engine.heartbeat(&"ghost".into()).await;
        assert!(matches!(
            waiting,
            Err(WaitlistError::NotActive { ref client }) if client.as_str() == "w"
        ));
        assert!(matches!(unknown, Err(WaitlistError::NotActive { .. })));
        assert_eq!(f.store.sessions().await, before);
    }

    #[tokio::test]
    async fn test_adjust_active_counter_never_negative() {
        let f = fixture(5);
        assert_eq!(f.engine.adjust_active_counter(-3).await.unwrap(), 0);
        assert_eq!(f.engine.adjust_active_counter(2).await.unwrap(), 2);
        assert_eq!(f.engine.adjust_active_counter(-1).await.unwrap(), 1);
        assert_eq!(f.engine.adjust_active_counter(-10).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_join_publishes_after_commit() {
        let f = fixture(1);
        let mut rx = f.engine.bus.subscribe();
        f.engine.join(&"a".into()).await.unwrap();
        f.engine.join(&"b".into()).await.unwrap();

        let kinds: Vec<EventKind> = (0..3).map(|_| rx.try_recv().unwrap().kind).collect();
        assert_eq!(
            kinds,
            [
                EventKind::SessionAdmitted,
                EventKind::CounterAdjusted,
                EventKind::SessionQueued
            ]
        );
    }

    async fn adjust_all(engine: &Arc<AdmissionEngine<MemoryStore>>, deltas: &[i64]) -> Vec<u64> {
        let mut handles = Vec::new();
        for &delta in deltas {
            let engine = Arc::clone(engine);
            handles.push(tokio::spawn(
                async move { engine.adjust_active_counter(delta).await },
            ));
        }
        let mut seen = Vec::new();
        for h in handles {
            seen.push(h.await.unwrap().unwrap());
        }
        seen
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_counter_adjustments() {
        let f = fixture(0);
        let engine = Arc::new(f.engine);

        // Same-sign batches end at the plain sum whatever the interleaving.
        let ups: Vec<i64> = (0..24).map(|i| i % 4 + 1).collect();
        adjust_all(&engine, &ups).await;
        let start = counter(&f.store).await;
        assert_eq!(start, 60);

        let mixed: [i64; 10] = [-25, 7, -40, 3, 12, -9, -30, 5, 1, -2];
        let seen = adjust_all(&engine, &mixed).await;
        let end = counter(&f.store).await;
        let raised: i64 = mixed.iter().filter(|d| **d > 0).sum();
        let total: i64 = mixed.iter().sum();
        assert!(end <= start + raised as u64);
        assert!(end as i64 >= (start as i64 + total).max(0));
        assert!(seen.contains(&end));

        let downs = [-50_i64; 8];
        let seen = adjust_all(&engine, &downs).await;
        assert!(seen.contains(&0));
        assert_eq!(counter(&f.store).await, 0);
    }
}
