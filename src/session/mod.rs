//! Session data model.
//!
//! One [`Session`] row exists per tracked client. Its [`Position`] is assigned once
//! and fixes the client's place in the FIFO queue; its [`SessionState`] says whether
//! the client holds an active slot or is waiting for one.
//!
//! ## Contents
//! - [`ClientId`], [`Position`] identifiers
//! - [`Status`], [`SessionState`], [`Session`] the stored row
//! - [`SessionView`], [`QueueBounds`] read-only projections handed to callers
//!
//! ## State machine
//! ```text
//!            Join (capacity free)
//!   (none) ─────────────────────────► Active { last_heartbeat }
//!     │                                  │   ▲
//!     │ Join (capacity full)             │   │ Reconciler promotion
//!     ▼                                  │   │
//!   Waiting { idle_since } ──────────────┼───┘
//!     │   ▲ Leave sets idle_since        │
//!     │   └ Join clears idle_since       │ stale heartbeat
//!     │ idle timeout                     ▼
//!     └──────────────────────────────► (deleted)
//! ```
//! There is no `Active → Waiting` edge.

mod bounds;
mod record;

pub use bounds::{QueueBounds, SessionView};
pub use record::{ClientId, Position, Session, SessionState, Status};
