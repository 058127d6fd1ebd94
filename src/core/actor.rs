//! # GrainActor: executes one grain lifecycle.
//!
//! Drives a [`Handler`] step by step with the grain's [`ResiliencePolicy`]:
//! - durable grains claim a checkpoint lease and resume from the last record;
//! - each `Continue` of a durable grain is persisted before the next step;
//! - transient errors are retried with backoff, fatal ones fail immediately;
//! - cancellation is observed at step boundaries and during backoff.
//!
//! ## Event flow
//! ```text
//! OnBegin
//!   step 0 ─► Continue ─► save(1) ─► Checkpointed ─► OnNext{step: 1} ─► Running
//!   step 1 ─► Fail ─► AttemptFailed ─► BackoffScheduled ─► [sleep] ─► step 1 again
//!   step 1 ─► Done(result) ─► Outcome
//! ```
//! The terminal events are published by the orchestrator from the returned
//! [`Outcome`], together with the chain consequences.
//!
//! ## Rules
//! - Steps run **sequentially**; a completed (checkpointed) step never re-runs.
//! - The attempt counter is monotonic over the lifecycle; the failure counter
//!   resets after each successful step.
//! - A `Done(Success)` that races a terminate request still succeeds.
//! - On success the checkpoint is removed; on failure or cancel it is kept.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    checkpoint::{CasResult, CheckpointStore, Lease},
    core::runner::run_step,
    error::GrainError,
    events::{Event, EventKind, Publisher},
    grains::{Grain, GrainResult, HandlerRef, HasResultCode, ResultCode, Stage, Step, StepContext},
    policies::ResiliencePolicy,
    scheduler::ChainScheduler,
};

/// Terminal result of one grain execution.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Outcome {
    pub stage: Stage,
    pub result: GrainResult,
    pub reason: Option<String>,
}

impl Outcome {
    fn succeeded(result: GrainResult) -> Self {
        Self {
            stage: Stage::Succeeded,
            result,
            reason: None,
        }
    }

    pub(crate) fn failed(code: ResultCode, reason: impl Into<String>) -> Self {
        Self {
            stage: Stage::Failed,
            result: GrainResult::code(code),
            reason: Some(reason.into()),
        }
    }

    fn cancelled() -> Self {
        Self {
            stage: Stage::Cancelled,
            result: GrainResult::code(ResultCode::Cancelled),
            reason: None,
        }
    }

    /// Maps a handler's final result to a terminal stage.
    fn from_result(result: GrainResult) -> Self {
        let code = result.code;
        match code {
            c if c.is_success() => Self::succeeded(result),
            ResultCode::Cancelled => Self {
                stage: Stage::Cancelled,
                result,
                reason: None,
            },
            c => Self {
                stage: Stage::Failed,
                reason: Some(format!("handler returned {c}")),
                result,
            },
        }
    }
}

/// Progress loaded from (and written to) the checkpoint store.
struct Progress {
    lease: Option<Lease>,
    step: u32,
    state: Option<Value>,
}

/// Executes one grain with retries, checkpoints and event publishing.
pub(crate) struct GrainActor {
    grain: Grain,
    handler: HandlerRef,
    resilience: ResiliencePolicy,
    events: Publisher,
    store: Arc<dyn CheckpointStore>,
    scheduler: Arc<Mutex<ChainScheduler>>,
}

impl GrainActor {
    pub fn new(
        grain: Grain,
        handler: HandlerRef,
        resilience: ResiliencePolicy,
        events: Publisher,
        store: Arc<dyn CheckpointStore>,
        scheduler: Arc<Mutex<ChainScheduler>>,
    ) -> Self {
        Self {
            grain,
            handler,
            resilience,
            events,
            store,
            scheduler,
        }
    }

    /// Runs the grain until `Done`, a terminal error, or cancellation.
    ///
    /// The grain must already be `Running` in the scheduler.
    pub async fn run(self, token: CancellationToken) -> Outcome {
        self.events.publish(
            self.lifecycle(EventKind::OnBegin)
                .with_stage(Stage::Running)
                .with_attempt(1),
        );

        let mut progress = match self.restore().await {
            Ok(p) => p,
            Err(outcome) => return outcome,
        };
        if progress.step > 0 {
            debug!(grain_id = self.grain.id(), step = progress.step, "resuming from checkpoint");
        }

        let mut attempt: u32 = 0;
        let mut failures: u32 = 0;

        loop {
            if token.is_cancelled() {
                return Outcome::cancelled();
            }
            attempt += 1;
            let ctx = StepContext {
                grain_id: self.grain.id_arc(),
                payload: Arc::clone(self.grain.payload()),
                state: progress.state.clone(),
                step: progress.step,
                attempt,
                token: token.clone(),
            };
            let res = run_step(
                self.handler.as_ref(),
                ctx,
                &token,
                self.resilience.attempt_timeout(),
                self.events.bus(),
            )
            .await;

            match res {
                Ok(Step::Continue(state)) => {
                    failures = 0;
                    progress.step += 1;
                    if let Err(outcome) = self.checkpoint(&progress, &state).await {
                        return outcome;
                    }
                    progress.state = Some(state);
                }
                Ok(Step::Done(result)) => {
                    let outcome = Outcome::from_result(result);
                    if outcome.stage == Stage::Succeeded && progress.lease.is_some() {
                        self.purge_checkpoint().await;
                    }
                    return outcome;
                }
                Err(GrainError::Canceled) => return Outcome::cancelled(),
                Err(e) if e.is_retryable() => {
                    failures += 1;
                    if !self.resilience.allows_retry(failures) {
                        return Outcome::failed(e.result_code(), e.to_string());
                    }
                    if token.is_cancelled() {
                        return Outcome::cancelled();
                    }

                    let delay = self.resilience.backoff.next(failures - 1);
                    self.events.bus().publish(
                        self.lifecycle(EventKind::BackoffScheduled)
                            .with_attempt(attempt)
                            .with_step(progress.step)
                            .with_delay(delay)
                            .with_reason(e.to_string()),
                    );

                    let sleep = time::sleep(delay);
                    tokio::pin!(sleep);
                    select! {
                        _ = &mut sleep => {}
                        _ = token.cancelled() => return Outcome::cancelled(),
                    }
                }
                Err(e) => return Outcome::failed(e.result_code(), e.to_string()),
            }
        }
    }

    /// Claims the lease and loads the last checkpoint of a durable grain.
    async fn restore(&self) -> Result<Progress, Outcome> {
        if !self.grain.is_durable() {
            return Ok(Progress {
                lease: None,
                step: 0,
                state: None,
            });
        }
        let id = self.grain.id();
        let lease = self.store.acquire(id).await.map_err(|e| {
            warn!(grain_id = id, error = %e, label = e.as_label(), "checkpoint lease failed");
            Outcome::failed(ResultCode::Error, e.to_string())
        })?;
        let record = self.store.load(id).await.map_err(|e| {
            warn!(grain_id = id, error = %e, label = e.as_label(), "checkpoint load failed");
            Outcome::failed(ResultCode::Error, e.to_string())
        })?;
        Ok(match record {
            Some(rec) => Progress {
                lease: Some(lease),
                step: rec.step,
                state: Some(rec.state),
            },
            None => Progress {
                lease: Some(lease),
                step: 0,
                state: None,
            },
        })
    }

    /// Persists a completed step, then publishes `OnNext`.
    async fn checkpoint(&self, progress: &Progress, state: &Value) -> Result<(), Outcome> {
        let Some(lease) = &progress.lease else {
            return Ok(());
        };
        match self.store.save(lease, progress.step, state.clone()).await {
            Ok(CasResult::Success) => {}
            Ok(rejected) => {
                warn!(grain_id = self.grain.id(), ?rejected, "checkpoint write fenced");
                return Err(Outcome::failed(
                    ResultCode::Error,
                    format!("stale checkpoint writer: {rejected:?}"),
                ));
            }
            Err(e) => {
                warn!(grain_id = self.grain.id(), error = %e, label = e.as_label(), "checkpoint write failed");
                return Err(Outcome::failed(ResultCode::Error, e.to_string()));
            }
        }

        let id = self.grain.id();
        self.scheduler().checkpointed(id);
        self.events.publish(
            self.lifecycle(EventKind::OnNext)
                .with_stage(Stage::Checkpointed)
                .with_step(progress.step),
        );
        self.scheduler().resumed(id);
        Ok(())
    }

    async fn purge_checkpoint(&self) {
        if let Err(e) = self.store.remove(self.grain.id()).await {
            warn!(grain_id = self.grain.id(), error = %e, "checkpoint purge failed");
        }
    }

    fn lifecycle(&self, kind: EventKind) -> Event {
        Event::new(kind)
            .with_grain(self.grain.id_arc())
            .with_client_key(self.grain.client_key().cloned())
    }

    fn scheduler(&self) -> std::sync::MutexGuard<'_, ChainScheduler> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
