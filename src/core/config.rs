//! # Orchestrator configuration.
//!
//! [`OrchestratorConfig`] centralizes the runtime settings. Used by
//! [`OrchestratorBuilder`](crate::OrchestratorBuilder) and as the source of the
//! default [`ResiliencePolicy`] applied to grains without an override.
//!
//! ## Sentinel values
//! - `max_concurrent = 0` → unlimited (no global semaphore)
//! - `retention = 0s` → terminal grains are purged on the next janitor pass
//! - `janitor_interval = 0s` → no janitor (terminal grains stay until shutdown)

use std::time::Duration;

use crate::policies::ResiliencePolicy;

/// Global configuration for the orchestrator runtime.
///
/// All fields are public; prefer the helper accessors over sprinkling
/// sentinel checks across the codebase.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Maximum time [`shutdown`](crate::Orchestrator::shutdown) waits for
    /// executing grains after cancelling them.
    pub grace: Duration,

    /// Maximum number of grains executing at once (`0` = unlimited).
    ///
    /// Queued grains past the limit stay `Queued` until a permit frees up.
    pub max_concurrent: usize,

    /// Capacity of the event bus ring buffer (min 1).
    pub bus_capacity: usize,

    /// Capacity of each [`GrainStream`](crate::GrainStream) (min 1).
    pub stream_capacity: usize,

    /// Resilience policy of grains that do not carry their own.
    pub resilience: ResiliencePolicy,

    /// How long a terminal grain stays visible (stage queries, resubmit with
    /// checkpoint resume, replay) before the janitor purges it.
    pub retention: Duration,

    /// Janitor period.
    pub janitor_interval: Duration,
}

impl OrchestratorConfig {
    /// Returns the global concurrency limit, `None` if unlimited.
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.max_concurrent == 0 {
            None
        } else {
            Some(self.max_concurrent)
        }
    }

    /// Returns the janitor period, `None` if the janitor is disabled.
    #[inline]
    pub fn janitor_period(&self) -> Option<Duration> {
        if self.janitor_interval == Duration::ZERO {
            None
        } else {
            Some(self.janitor_interval)
        }
    }

    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    #[inline]
    pub fn stream_capacity_clamped(&self) -> usize {
        self.stream_capacity.max(1)
    }
}

impl Default for OrchestratorConfig {
    /// - `grace = 30s`
    /// - `max_concurrent = 0` (unlimited)
    /// - `bus_capacity = 4096`, `stream_capacity = 256`
    /// - `resilience = ResiliencePolicy::default()`
    /// - `retention = 10min`, `janitor_interval = 60s`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(30),
            max_concurrent: 0,
            bus_capacity: 4096,
            stream_capacity: 256,
            resilience: ResiliencePolicy::default(),
            retention: Duration::from_secs(600),
            janitor_interval: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels() {
        let mut cfg = OrchestratorConfig::default();
        assert_eq!(cfg.concurrency_limit(), None);
        cfg.max_concurrent = 4;
        cfg.janitor_interval = Duration::ZERO;
        cfg.bus_capacity = 0;
        assert_eq!(cfg.concurrency_limit(), Some(4));
        assert_eq!(cfg.janitor_period(), None);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
