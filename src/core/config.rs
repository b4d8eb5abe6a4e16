//! # Session configuration.
//!
//! Provides [`Config`] centralized settings for one supervised session.
//!
//! Config is used in two ways:
//! 1. **Supervisor creation**: `Supervisor::builder(config)`
//! 2. **Coordinator and reaper tuning**: grace periods, retry budget
//!
//! ## Sentinel values
//! - `timeout = 0s` → no timeout (see [`Config::main_timeout`])
//! - `bus_capacity = 0` → clamped to 1 (see [`Config::bus_capacity_clamped`])

use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Settings for one supervised session.
///
/// ## Field semantics
/// - `grace`: how long main may take to exit after it was asked to (signal or timeout)
/// - `drain_grace`: how long leftover descendants get between SIGTERM and SIGKILL
/// - `drain_poll`: census interval while draining
/// - `timeout`: maximum run time of main (`0s` = unbounded)
/// - `reap_retries`/`reap_backoff`: retry budget for failing `waitpid` passes,
///   also the number of SIGKILL rounds before draining gives up
///
/// ## Notes
/// All fields are public for flexibility. Prefer using helper accessors to avoid
/// sprinkling sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum wait for main to exit after a terminating signal or a timeout.
    ///
    /// Main's process group is SIGKILLed when it expires.
    pub grace: Duration,

    /// Time between SIGTERM and SIGKILL for descendants left after main exited.
    pub drain_grace: Duration,

    /// How often the coordinator asks the reaper for a census while draining.
    pub drain_poll: Duration,

    /// Maximum run time of main.
    ///
    /// - `Duration::ZERO` = no timeout
    /// - `> 0` = main gets SIGTERM, then SIGKILL after `grace`
    pub timeout: Duration,

    /// Report a timeout as success (exit 0) instead of 124.
    pub timeout_is_ok: bool,

    /// Relay signals to main's whole process group (main runs as group leader).
    ///
    /// When `false`, main is not put in its own group and only its pid is signaled.
    pub forward_to_group: bool,

    /// A second terminating signal SIGKILLs main right away.
    pub escalate_repeated: bool,

    /// Retry budget for failing reap passes and for SIGKILL rounds while draining.
    pub reap_retries: u32,

    /// Delays between failing reap passes.
    pub reap_backoff: BackoffPolicy,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,
}

impl Config {
    /// Returns the main timeout as an `Option`.
    ///
    /// - `None` → no timeout
    /// - `Some(d)` → main is terminated after `d`
    #[inline]
    pub fn main_timeout(&self) -> Option<Duration> {
        if self.timeout == Duration::ZERO {
            None
        } else {
            Some(self.timeout)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Census interval, never zero so draining cannot spin.
    #[inline]
    pub fn drain_poll_clamped(&self) -> Duration {
        self.drain_poll.max(Duration::from_millis(1))
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `grace = 10s`
    /// - `drain_grace = 2s`
    /// - `drain_poll = 20ms`
    /// - `timeout = 0s` (no timeout)
    /// - `timeout_is_ok = false`
    /// - `forward_to_group = true`
    /// - `escalate_repeated = true`
    /// - `reap_retries = 5`
    /// - `reap_backoff = BackoffPolicy::default()`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(10),
            drain_grace: Duration::from_secs(2),
            drain_poll: Duration::from_millis(20),
            timeout: Duration::ZERO,
            timeout_is_ok: false,
            forward_to_group: true,
            escalate_repeated: true,
            reap_retries: 5,
            reap_backoff: BackoffPolicy::default(),
            bus_capacity: 1024,
        }
    }
}
