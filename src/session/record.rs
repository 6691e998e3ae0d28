use std::fmt;
use std::sync::Arc;

use crate::clock::Timestamp;

/// Opaque client-supplied identifier, unique per session row.
///
/// Cheap to clone (`Arc<str>` inside).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(Arc<str>);

impl ClientId {
    /// Creates a client id.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<ClientId> for Arc<str> {
    fn from(id: ClientId) -> Self {
        id.0
    }
}

/// FIFO position of a session.
///
/// Assigned once at creation, strictly increasing across every session ever
/// created, never reused.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position(u64);

impl Position {
    /// Position of the very first session.
    pub const FIRST: Position = Position(0);

    /// Creates a position from its raw value.
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Returns the position assigned after this one.
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse status of a session, used as the leading key of the store indexes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    /// Queued for a slot.
    Waiting,
    /// Holds an active slot.
    Active,
}

impl Status {
    /// Returns a short stable label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Waiting => "waiting",
            Status::Active => "active",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-status payload of a session.
///
/// The single "last active" timestamp means different things depending on status,
/// so each status carries its own field:
/// - `Active`: time of the last liveness signal; drives stale eviction.
/// - `Waiting`: `None` while the client is engaged, `Some(t)` once it reported
///   going idle at `t`; drives idle eviction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Holds an active slot.
    Active {
        /// Last heartbeat (or admission time).
        last_heartbeat: Timestamp,
    },
    /// Queued for a slot.
    Waiting {
        /// Start of the idle clock; `None` means never evict for idleness.
        idle_since: Option<Timestamp>,
    },
}

impl SessionState {
    /// Returns the coarse status.
    #[inline]
    pub fn status(&self) -> Status {
        match self {
            SessionState::Active { .. } => Status::Active,
            SessionState::Waiting { .. } => Status::Waiting,
        }
    }

    /// Returns the timestamp indexed for eviction, if any.
    #[inline]
    pub fn last_active(&self) -> Option<Timestamp> {
        match *self {
            SessionState::Active { last_heartbeat } => Some(last_heartbeat),
            SessionState::Waiting { idle_since } => idle_since,
        }
    }
}

/// One tracked client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    /// Client identifier (primary key).
    pub id: ClientId,
    /// FIFO position, fixed at creation.
    pub position: Position,
    /// Status and its timestamp.
    pub state: SessionState,
}

impl Session {
    /// Creates an admitted session.
    pub fn active(id: ClientId, position: Position, now: Timestamp) -> Self {
        Self {
            id,
            position,
            state: SessionState::Active {
                last_heartbeat: now,
            },
        }
    }

    /// Creates an engaged waiting session (no idle clock running).
    pub fn waiting(id: ClientId, position: Position) -> Self {
        Self {
            id,
            position,
            state: SessionState::Waiting { idle_since: None },
        }
    }

    #[inline]
    pub fn status(&self) -> Status {
        self.state.status()
    }

    #[inline]
    pub fn last_active(&self) -> Option<Timestamp> {
        self.state.last_active()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active { .. })
    }
}
