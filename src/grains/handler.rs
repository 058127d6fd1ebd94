//! # Handler abstraction.
//!
//! A [`Handler`] is the business logic behind a grain type. The engine drives it
//! one **step** at a time:
//!
//! ```text
//! step(ctx{step: 0, state: None})      ─► Continue(s1)   ─► checkpoint(1, s1)
//! step(ctx{step: 1, state: Some(s1)})  ─► Continue(s2)   ─► checkpoint(2, s2)
//! step(ctx{step: 2, state: Some(s2)})  ─► Done(result)
//! ```
//!
//! After a crash or a terminate/resubmit of a durable grain the engine calls
//! `step` again with the last checkpointed `step`/`state`, never with an
//! earlier one. Steps should be idempotent: an in-flight step that was not
//! checkpointed runs again.
//!
//! Handlers receive a [`CancellationToken`] in the context and may check it to
//! stop a long step early by returning [`GrainError::Canceled`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::GrainError;
use crate::grains::GrainResult;

/// Input of one handler step.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Id of the grain being executed.
    pub grain_id: Arc<str>,
    /// Opaque input payload from the submitter.
    pub payload: Arc<Value>,
    /// State returned by the previous `Continue`, or the checkpointed state on resume.
    pub state: Option<Value>,
    /// Zero-based index of this step (= number of completed steps).
    pub step: u32,
    /// Lifetime attempt counter of this execution (1-based, monotonic).
    pub attempt: u32,
    /// Cancelled on terminate, timeout or shutdown.
    pub token: CancellationToken,
}

impl StepContext {
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Outcome of a successful handler step.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// One internal step completed; carry `state` into the next step.
    Continue(Value),
    /// The grain finished with this result.
    Done(GrainResult),
}

/// # Business logic of one grain type.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use grainvisor::{GrainError, GrainResult, Handler, Step, StepContext};
///
/// struct Echo;
///
/// #[async_trait]
/// impl Handler for Echo {
///     async fn step(&self, ctx: StepContext) -> Result<Step, GrainError> {
///         Ok(Step::Done(GrainResult::success((*ctx.payload).clone())))
///     }
/// }
/// ```
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Executes one step.
    async fn step(&self, ctx: StepContext) -> Result<Step, GrainError>;
}

/// Shared handler handle.
pub type HandlerRef = Arc<dyn Handler>;
