//! # Function-backed handler (`HandlerFn`)
//!
//! [`HandlerFn`] wraps a closure `F: Fn(StepContext) -> Fut`, producing a fresh
//! future per step. No state is shared between steps except what the closure
//! captures explicitly (use `Arc<...>` for that).
//!
//! ## Example
//! ```rust
//! use grainvisor::{GrainResult, HandlerFn, HandlerRef, Step, StepContext, GrainError};
//!
//! let h: HandlerRef = HandlerFn::arc(|ctx: StepContext| async move {
//!     if ctx.step < 2 {
//!         return Ok(Step::Continue(serde_json::json!({ "done": ctx.step + 1 })));
//!     }
//!     Ok::<_, GrainError>(Step::Done(GrainResult::success(serde_json::json!("ok"))))
//! });
//! # let _ = h;
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::GrainError;
use crate::grains::handler::{Handler, Step, StepContext};

/// Function-backed handler implementation.
pub struct HandlerFn<F> {
    f: F,
}

impl<F> HandlerFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Step, GrainError>> + Send + 'static,
{
    async fn step(&self, ctx: StepContext) -> Result<Step, GrainError> {
        (self.f)(ctx).await
    }
}
