//! # Time source for the waitlist.
//!
//! Every timestamp the engine writes comes from a [`Clock`]. Production code uses
//! [`SystemClock`]; tests and simulations use [`ManualClock`] and move time forward
//! explicitly, which is how staleness is simulated without sleeping.
//!
//! [`Timestamp`] is milliseconds since the UNIX epoch. It is `Ord`, so it can be
//! used directly as a component of an ordered index key.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock instant in milliseconds since the UNIX epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The UNIX epoch.
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Returns milliseconds since the UNIX epoch.
    #[inline]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Returns `self - d`, clamped at the epoch.
    ///
    /// Used to compute eviction cutoffs (`now - timeout`).
    #[inline]
    pub fn saturating_sub(&self, d: Duration) -> Self {
        Self(self.0.saturating_sub(duration_millis(d)))
    }

    /// Returns `self + d`, clamped at `u64::MAX` milliseconds.
    #[inline]
    pub fn saturating_add(&self, d: Duration) -> Self {
        Self(self.0.saturating_add(duration_millis(d)))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

fn duration_millis(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}

/// Source of "now".
pub trait Clock: Send + Sync + 'static {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Clock backed by [`SystemTime`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        // A system clock set before 1970 reads as the epoch.
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(duration_millis)
            .unwrap_or(0);
        Timestamp(ms)
    }
}

/// Manually driven clock.
///
/// Starts at the given instant and only moves when [`ManualClock::advance`] or
/// [`ManualClock::set`] is called.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use waitvisor::{Clock, ManualClock, Timestamp};
///
/// let clock = ManualClock::new(Timestamp::from_millis(1_000));
/// clock.advance(Duration::from_secs(2));
/// assert_eq!(clock.now(), Timestamp::from_millis(3_000));
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    ms: AtomicU64,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            ms: AtomicU64::new(start.as_millis()),
        }
    }

    /// Moves the clock forward by `d`.
    pub fn advance(&self, d: Duration) {
        let step = duration_millis(d);
        let _ = self
            .ms
            .fetch_update(AtomicOrdering::AcqRel, AtomicOrdering::Acquire, |ms| {
                Some(ms.saturating_add(step))
            });
    }

    /// Jumps the clock to `at` (may move backwards).
    pub fn set(&self, at: Timestamp) {
        self.ms.store(at.as_millis(), AtomicOrdering::Release);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.ms.load(AtomicOrdering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturating_sub_clamps_at_epoch() {
        let t = Timestamp::from_millis(500);
        assert_eq!(t.saturating_sub(Duration::from_secs(1)), Timestamp::EPOCH);
        assert_eq!(
            t.saturating_sub(Duration::from_millis(200)),
            Timestamp::from_millis(300)
        );
    }

    #[test]
    fn test_manual_clock_advances_only_when_told() {
        let clock = ManualClock::new(Timestamp::from_millis(10));
        assert_eq!(clock.now(), Timestamp::from_millis(10));
        clock.advance(Duration::from_millis(5));
        assert_eq!(clock.now(), Timestamp::from_millis(15));
        clock.set(Timestamp::from_millis(1));
        assert_eq!(clock.now(), Timestamp::from_millis(1));
    }

    #[test]
    fn test_system_clock_is_after_epoch() {
        assert!(SystemClock.now() > Timestamp::EPOCH);
    }
}
