//! Retry and resilience policies.
//!
//! ## Contents
//! - [`ResiliencePolicy`] retry budget, backoff and per-attempt timeout of a grain
//! - [`BackoffPolicy`] how retry delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`] randomization strategy to avoid synchronized retries
//!
//! ## Quick wiring
//! ```text
//! Grain { resilience: ResiliencePolicy { max_retries, backoff, timeout } }
//!      └─► core::actor::GrainActor uses:
//!           - max_retries to decide retry/fail after a transient error
//!           - backoff.next(failures - 1) to schedule the next attempt
//!           - timeout to bound each handler step
//! ```
//!
//! ## Defaults
//! - `ResiliencePolicy::default()` → 3 retries, default backoff, no timeout.
//! - `BackoffPolicy::default()` → first=100ms, factor=1.0 (constant), max=30s, jitter=None.

mod backoff;
mod jitter;
mod resilience;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use resilience::ResiliencePolicy;
