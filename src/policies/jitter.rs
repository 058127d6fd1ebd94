//! # Jitter applied to backoff delays.
//!
//! Grains that fail together (a shared downstream going away) would otherwise
//! retry in lockstep. [`JitterPolicy`] spreads their retries over a window
//! derived from the unjittered base delay.
//!
//! | policy         | window                                  |
//! |----------------|-----------------------------------------|
//! | `None`         | `base` exactly                          |
//! | `Full`         | `[0, base]`                             |
//! | `Equal`        | `[base/2, base]`                        |
//! | `Decorrelated` | `[floor, min(base * 3, cap)]`           |

use std::time::Duration;

use rand::Rng;

/// Randomization strategy for retry delays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Exact backoff delay; what tests use.
    #[default]
    None,
    Full,
    Equal,
    /// Wide window anchored at the first delay; spreads bursts the most.
    Decorrelated,
}

impl JitterPolicy {
    /// Picks the actual delay for an unjittered `base`.
    ///
    /// `floor` and `cap` bound the decorrelated window; other policies stay
    /// within `[0, base]`.
    pub fn spread(&self, base: Duration, floor: Duration, cap: Duration) -> Duration {
        let base_ms = millis(base);
        match self {
            JitterPolicy::None => base,
            JitterPolicy::Full => uniform_ms(0, base_ms),
            JitterPolicy::Equal => uniform_ms(base_ms / 2, base_ms),
            JitterPolicy::Decorrelated => {
                let lo = millis(floor);
                let hi = base_ms.saturating_mul(3).min(millis(cap)).max(lo);
                uniform_ms(lo, hi)
            }
        }
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}

fn uniform_ms(lo: u64, hi: u64) -> Duration {
    if lo >= hi {
        return Duration::from_millis(lo);
    }
    Duration::from_millis(rand::rng().random_range(lo..=hi))
}
