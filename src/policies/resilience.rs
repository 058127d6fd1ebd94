//! # Resilience policy for grain execution.
//!
//! [`ResiliencePolicy`] bundles the three knobs the execution engine applies to
//! every step of a grain:
//! - `max_retries`: how many times a transient failure is retried;
//! - `backoff`: how long to wait between attempts ([`BackoffPolicy`]);
//! - `timeout`: optional per-attempt deadline.
//!
//! ```text
//! step ─► attempt 1 ─► Fail ─► backoff.next(0) ─► attempt 2 ─► Fail ─► ... ─► Failed
//!                                                                 (after max_retries)
//! ```
//!
//! The failure counter is per step: a successful checkpoint resets it.

use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Retry count, backoff and per-attempt timeout.
#[derive(Clone, Copy, Debug)]
pub struct ResiliencePolicy {
    /// Retries after the first failed attempt (`0` = fail on first error).
    pub max_retries: u32,
    /// Delay strategy between attempts.
    pub backoff: BackoffPolicy,
    /// Per-attempt timeout (`None` or zero = no timeout).
    pub timeout: Option<Duration>,
}

impl Default for ResiliencePolicy {
    /// Three retries, default backoff, no timeout.
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffPolicy::default(),
            timeout: None,
        }
    }
}

impl ResiliencePolicy {
    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Returns the timeout if it is set and non-zero.
    #[inline]
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|d| *d > Duration::ZERO)
    }

    /// Returns true if another attempt is allowed after `failures` consecutive failures.
    #[inline]
    pub fn allows_retry(&self, failures: u32) -> bool {
        failures <= self.max_retries
    }

    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_means_none() {
        let p = ResiliencePolicy::default().with_timeout(Duration::ZERO);
        assert_eq!(p.attempt_timeout(), None);
        let p = p.with_timeout(Duration::from_millis(5));
        assert_eq!(p.attempt_timeout(), Some(Duration::from_millis(5)));
    }

    #[test]
    fn retry_budget() {
        let p = ResiliencePolicy::default().with_max_retries(2);
        assert!(p.allows_retry(1));
        assert!(p.allows_retry(2));
        assert!(!p.allows_retry(3));
        assert!(!ResiliencePolicy::no_retry().allows_retry(1));
    }
}
