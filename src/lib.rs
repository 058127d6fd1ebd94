//! # grainvisor
//!
//! **Grainvisor** orchestrates *grains*: small units of work of a registered
//! type, submitted with a JSON payload and executed by a handler.
//!
//! Grains can be delayed, ordered into chains or explicit dependency graphs,
//! resumed from durable checkpoints after cancellation or a restart, retried
//! with backoff, and observed through an ordered lifecycle event stream.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   submit(Grain) / submit_json(..)           terminate(id)
//!            │                                     │
//! ┌──────────▼─────────────────────────────────────▼──────────────────┐
//! │  Orchestrator                                                     │
//! │  - HandlerRegistry (type name → handler factory)                  │
//! │  - ChainScheduler  (stages, chains, dependencies, skip cascade)   │
//! │  - DelayGate       (one timer for every delayed grain)            │
//! │  - Semaphore       (optional global concurrency limit)            │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   ┌───────────┐      ┌───────────┐      ┌───────────┐
//!   │GrainActor │      │GrainActor │      │GrainActor │   ◄─► CheckpointStore
//!   │ steps +   │      │ steps +   │      │ steps +   │       (lease + CAS)
//!   │ retries   │      │ retries   │      │ retries   │
//!   └─────┬─────┘      └─────┬─────┘      └─────┬─────┘
//!         │ OnBegin, OnNext(step), AttemptFailed, BackoffScheduled, ...
//!         ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │           Publisher: LatestTracker (replay) + Bus (broadcast)     │
//! └──────────┬──────────────────────────┬─────────────────────────────┘
//!            ▼                          ▼
//!   GrainStream (Topic::Grain /   subscriber listener ──► SubscriberSet
//!   Topic::Client / Topic::All)                          (per-sub queues)
//! ```
//!
//! ### Grain lifecycle
//! ```text
//! Seeded ─┬─► Queued ─► Running ⇄ Checkpointed ─┬─► Succeeded
//! Delayed ┘      │                              ├─► Failed
//!   │            │                              └─► Cancelled
//!   └────────────┴──► Cancelled | SkippedDueToDependency
//! ```
//!
//! Per grain, lifecycle events arrive as
//! `OnBegin → OnNext* → [OnError] → OnCompleted`; grains that never run emit
//! only `OnCompleted`.
//!
//! ## Features
//! | Area              | Description                                                 | Key types / traits                         |
//! |-------------------|-------------------------------------------------------------|--------------------------------------------|
//! | **Orchestration** | Admission, chains, delays, cancellation, graceful shutdown. | [`Orchestrator`], [`OrchestratorConfig`]   |
//! | **Handlers**      | Step-wise handlers registered by type name.                 | [`Handler`], [`HandlerFn`], [`HandlerRegistry`] |
//! | **Durability**    | Leased, fenced checkpoints; resume from the last step.      | [`CheckpointStore`], [`FileCheckpointStore`] |
//! | **Policies**      | Retry budget, per-attempt timeout, backoff with jitter.     | [`ResiliencePolicy`], [`BackoffPolicy`]    |
//! | **Events**        | Ordered lifecycle streams with replay for late subscribers. | [`GrainStream`], [`Topic`], [`Event`]      |
//! | **Subscribers**   | Fan-out of every event to isolated observers.               | [`Subscribe`], [`LogWriter`]               |
//!
//! ## Example
//! ```rust
//! use grainvisor::{
//!     Grain, GrainError, GrainResult, Orchestrator, OrchestratorConfig, Stage, Step,
//!     StepContext, Topic,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orch = Orchestrator::builder(OrchestratorConfig::default()).build();
//!     orch.registry().register_fn("echo", |ctx: StepContext| async move {
//!         Ok::<_, GrainError>(Step::Done(GrainResult::success((*ctx.payload).clone())))
//!     });
//!
//!     let mut stream = orch.subscribe(Topic::client("c1"));
//!     orch.submit(Grain::new("a", "echo").with_chain("k").with_client_key("c1"))?;
//!     orch.submit(Grain::new("b", "echo").with_chain("k").with_client_key("c1"))?;
//!
//!     let mut completed = 0;
//!     while let Some(ev) = stream.recv().await {
//!         if ev.is_terminal() {
//!             assert_eq!(ev.stage, Some(Stage::Succeeded));
//!             completed += 1;
//!             if completed == 2 {
//!                 break;
//!             }
//!         }
//!     }
//!
//!     orch.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod checkpoint;
mod core;
mod delay;
mod error;
mod events;
mod grains;
mod policies;
mod scheduler;
mod subscribers;

// ---- Public re-exports ----

pub use checkpoint::{
    CasResult, CheckpointError, CheckpointRecord, CheckpointStore, FileCheckpointStore, Lease,
    MemoryCheckpointStore,
};
pub use core::{Orchestrator, OrchestratorBuilder, OrchestratorConfig};
pub use delay::DelayGate;
pub use error::{GrainError, RuntimeError};
pub use events::{Bus, Event, EventKind, GrainStream, LatestTracker, Topic};
pub use grains::{
    Grain, GrainRequest, GrainResult, Handler, HandlerFactory, HandlerFn, HandlerRef,
    HandlerRegistry, HasResultCode, RegistryError, ResultCode, Stage, Step, StepContext,
};
pub use policies::{BackoffPolicy, JitterPolicy, ResiliencePolicy};
pub use scheduler::{
    Admission, AdmissionError, CancelDecision, ChainScheduler, Completion, GrainSnapshot, Settled,
    TerminateError,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
