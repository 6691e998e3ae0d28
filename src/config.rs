//! # Waitlist configuration.
//!
//! [`Config`] centralizes capacity, timeouts and runtime knobs.
//!
//! Config is used in two ways:
//! 1. **Explicitly**: `Config { active_capacity: 10, ..Config::default() }`
//! 2. **From the environment**: [`Config::from_env`] at startup
//!
//! ## Environment
//! | Variable                            | Field                  | Default |
//! |-------------------------------------|------------------------|---------|
//! | `ACTIVE_SESSIONS_COUNT_LIMIT`       | `active_capacity`      | 100     |
//! | `ACTIVE_SESSION_TIMEOUT_SECONDS`    | `active_stale_timeout` | 300 s   |
//! | `WAITING_SESSION_TIMEOUT_SECONDS`   | `waiting_idle_timeout` | 60 s    |
//! | `WAITLIST_UPDATE_INTERVAL_SECONDS`  | `reconcile_interval`   | 60 s    |
//! | `WAITLIST_SWEEP_LIMIT`              | `sweep_limit`          | 1000    |
//! | `WAITLIST_BUS_CAPACITY`             | `bus_capacity`         | 1024    |
//!
//! A missing or unparsable value resolves to the default; misconfiguration is
//! never a runtime error.
//!
//! ## Sentinel values
//! - `sweep_limit = 0` → clamped to 1
//! - `bus_capacity = 0` → clamped to 1
//! - `reconcile_interval = 0s` → clamped to 1s

use std::time::Duration;

pub const ENV_ACTIVE_CAPACITY: &str = "ACTIVE_SESSIONS_COUNT_LIMIT";
pub const ENV_ACTIVE_STALE_TIMEOUT: &str = "ACTIVE_SESSION_TIMEOUT_SECONDS";
pub const ENV_WAITING_IDLE_TIMEOUT: &str = "WAITING_SESSION_TIMEOUT_SECONDS";
pub const ENV_RECONCILE_INTERVAL: &str = "WAITLIST_UPDATE_INTERVAL_SECONDS";
pub const ENV_SWEEP_LIMIT: &str = "WAITLIST_SWEEP_LIMIT";
pub const ENV_BUS_CAPACITY: &str = "WAITLIST_BUS_CAPACITY";

/// Configuration for the waitlist engine and its reconciler.
///
/// ## Field semantics
/// - `active_capacity`: maximum simultaneously active clients
/// - `active_stale_timeout`: an active client without heartbeat for longer is evicted
/// - `waiting_idle_timeout`: a waiting client idle for longer is dropped from the queue
/// - `reconcile_interval`: period of the reconcile driver
/// - `sweep_limit`: max rows deleted per eviction step per tick
/// - `bus_capacity`: event bus ring buffer size
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of simultaneously active sessions.
    pub active_capacity: u64,

    /// How long an active session may go without a heartbeat.
    pub active_stale_timeout: Duration,

    /// How long a waiting session may stay idle before it is dropped.
    pub waiting_idle_timeout: Duration,

    /// Interval between reconcile ticks.
    pub reconcile_interval: Duration,

    /// Maximum sessions evicted per eviction step in one tick.
    ///
    /// Bounds the cost of a single tick after a mass disconnect; the remainder is
    /// picked up on the following ticks.
    pub sweep_limit: usize,

    /// Capacity of the event bus broadcast channel.
    pub bus_capacity: usize,
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `active_capacity = 100`
    /// - `active_stale_timeout = 5min`
    /// - `waiting_idle_timeout = 60s`
    /// - `reconcile_interval = 60s`
    /// - `sweep_limit = 1000`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            active_capacity: 100,
            active_stale_timeout: Duration::from_secs(5 * 60),
            waiting_idle_timeout: Duration::from_secs(60),
            reconcile_interval: Duration::from_secs(60),
            sweep_limit: 1000,
            bus_capacity: 1024,
        }
    }
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    ///
    /// ## Example
    /// ```rust
    /// use std::time::Duration;
    /// use waitvisor::Config;
    ///
    /// let cfg = Config::from_lookup(|key| match key {
    ///     "ACTIVE_SESSIONS_COUNT_LIMIT" => Some("2".to_string()),
    ///     "WAITING_SESSION_TIMEOUT_SECONDS" => Some("soon".to_string()),
    ///     _ => None,
    /// });
    /// assert_eq!(cfg.active_capacity, 2);
    /// assert_eq!(cfg.waiting_idle_timeout, Duration::from_secs(60));
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let u64_of = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let secs_of = |key: &str| u64_of(key).map(Duration::from_secs);

        Self {
            active_capacity: u64_of(ENV_ACTIVE_CAPACITY).unwrap_or(defaults.active_capacity),
            active_stale_timeout: secs_of(ENV_ACTIVE_STALE_TIMEOUT)
                .unwrap_or(defaults.active_stale_timeout),
            waiting_idle_timeout: secs_of(ENV_WAITING_IDLE_TIMEOUT)
                .unwrap_or(defaults.waiting_idle_timeout),
            reconcile_interval: secs_of(ENV_RECONCILE_INTERVAL)
                .unwrap_or(defaults.reconcile_interval),
            sweep_limit: u64_of(ENV_SWEEP_LIMIT)
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(defaults.sweep_limit),
            bus_capacity: u64_of(ENV_BUS_CAPACITY)
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(defaults.bus_capacity),
        }
    }

    /// Returns the per-step eviction cap, at least 1.
    #[inline]
    pub fn sweep_limit_clamped(&self) -> usize {
        self.sweep_limit.max(1)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the reconcile interval, at least one second.
    ///
    /// `tokio::time::interval` panics on a zero period.
    #[inline]
    pub fn reconcile_interval_clamped(&self) -> Duration {
        self.reconcile_interval.max(Duration::from_secs(1))
    }
}
