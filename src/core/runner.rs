//! # Run a single attempt of one handler step.
//!
//! - derives a **child token** per attempt, so a timeout cancels only this attempt;
//! - applies the optional per-attempt timeout;
//! - catches panics and turns them into [`GrainError::Fatal`];
//! - publishes the attempt diagnostics.
//!
//! ```text
//! Ok(step)                       → (nothing published here)
//! Err(Canceled)                  → (nothing published; actor decides)
//! Err(Fail/Fatal), panic         → AttemptFailed
//! timeout elapsed → child.cancel → TimeoutHit → AttemptFailed → Err(Timeout)
//! ```
//!
//! Cancellation of the parent token is never raced against the step: a step
//! that already started runs to completion and the actor stops at the next
//! boundary.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::{
    error::GrainError,
    events::{Bus, Event, EventKind},
    grains::{Handler, Step, StepContext},
    subscribers::panic_message,
};

/// Executes one attempt of `ctx.step`, publishing diagnostics to `bus`.
pub(crate) async fn run_step(
    handler: &dyn Handler,
    mut ctx: StepContext,
    parent: &CancellationToken,
    timeout: Option<Duration>,
    bus: &Bus,
) -> Result<Step, GrainError> {
    let child = parent.child_token();
    ctx.token = child.clone();
    let grain_id = ctx.grain_id.clone();
    let (step, attempt) = (ctx.step, ctx.attempt);

    let guarded = AssertUnwindSafe(handler.step(ctx)).catch_unwind();
    let caught = match timeout {
        Some(dur) => match time::timeout(dur, guarded).await {
            Ok(r) => r,
            Err(_elapsed) => {
                child.cancel();
                bus.publish(
                    Event::new(EventKind::TimeoutHit)
                        .with_grain(grain_id.clone())
                        .with_attempt(attempt)
                        .with_step(step)
                        .with_timeout(dur),
                );
                Ok(Err(GrainError::Timeout { timeout: dur }))
            }
        },
        None => guarded.await,
    };

    let res = caught.unwrap_or_else(|panic| {
        Err(GrainError::fatal(format!(
            "handler panicked: {}",
            panic_message(&*panic)
        )))
    });

    if let Err(e) = &res
        && !matches!(e, GrainError::Canceled)
    {
        bus.publish(
            Event::new(EventKind::AttemptFailed)
                .with_grain(grain_id)
                .with_attempt(attempt)
                .with_step(step)
                .with_reason(e.to_string()),
        );
    }
    res
}
