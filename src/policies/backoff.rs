//! # Delays between failed reap passes.
//!
//! When `waitpid` fails with anything but `EINTR` or `ECHILD`, the reaper
//! sleeps for [`BackoffPolicy::next`] before trying again. Delays grow as
//! `first × factor^attempt` and never exceed `max`; a factor below `1.0`
//! (or NaN) is read as `1.0`, so delays never shrink.
//!
//! The retry count itself is not part of the policy: it lives in
//! [`Config::reap_retries`](crate::Config::reap_retries).
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use procvisor::BackoffPolicy;
//!
//! let backoff = BackoffPolicy::default();
//! assert_eq!(backoff.next(0), Duration::from_millis(10));
//! assert_eq!(backoff.next(3), Duration::from_millis(80));
//! assert_eq!(backoff.next(30), Duration::from_secs(1));
//! assert_eq!(backoff.total(3), Duration::from_millis(70));
//! ```

use std::time::Duration;

/// Growth of the delay between consecutive reap retries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Upper bound for any single delay.
    pub max: Duration,
    /// Growth per attempt.
    pub factor: f64,
}

impl Default for BackoffPolicy {
    /// 10ms, doubling, capped at 1s.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(10),
            max: Duration::from_secs(1),
            factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (0-indexed).
    pub fn next(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.first.as_secs_f64() * self.factor.max(1.0).powi(exp);
        Duration::try_from_secs_f64(secs).map_or(self.max, |d| d.min(self.max))
    }

    /// Time spent sleeping by a pass that fails `retries` times in a row.
    pub fn total(&self, retries: u32) -> Duration {
        (0..retries)
            .map(|attempt| self.next(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(first_ms: u64, max_ms: u64, factor: f64) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(first_ms),
            max: Duration::from_millis(max_ms),
            factor,
        }
    }

    #[test]
    fn test_delays_double_until_capped() {
        let p = policy(10, 50, 2.0);
        let delays: Vec<u64> = (0..5).map(|a| p.next(a).as_millis() as u64).collect();
        assert_eq!(delays, vec![10, 20, 40, 50, 50]);
    }

    #[test]
    fn test_shrinking_factor_is_flat() {
        for factor in [1.0, 0.5, -3.0, f64::NAN] {
            let p = policy(25, 1000, factor);
            assert_eq!(p.next(0), Duration::from_millis(25));
            assert_eq!(p.next(7), Duration::from_millis(25));
        }
    }

    #[test]
    fn test_first_above_max_is_capped() {
        assert_eq!(policy(5000, 1000, 2.0).next(0), Duration::from_secs(1));
    }

    #[test]
    fn test_huge_attempts_do_not_overflow() {
        let p = policy(10, 1000, 10.0);
        assert_eq!(p.next(u32::MAX), Duration::from_secs(1));
        assert_eq!(policy(10, 1000, f64::INFINITY).next(1), Duration::from_secs(1));
    }

    #[test]
    fn test_total_matches_default_reap_budget() {
        let p = BackoffPolicy::default();
        assert_eq!(p.total(0), Duration::ZERO);
        // 10 + 20 + 40 + 80 + 160
        assert_eq!(p.total(5), Duration::from_millis(310));
    }
}
