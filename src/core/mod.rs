//! Runtime core: admission, execution and shutdown.
//!
//! The public surface is [`Orchestrator`], its [`OrchestratorBuilder`] and
//! [`OrchestratorConfig`].
//!
//! Internal modules:
//! - [`runner`]: one attempt of one step, with timeout and panic capture;
//! - [`actor`]: one grain, with retries, checkpoints and lifecycle events;
//! - [`orchestrator`]: admission, chains, concurrency, shutdown;
//! - [`shutdown`]: OS signal handling.

mod actor;
mod builder;
mod config;
mod orchestrator;
mod runner;
mod shutdown;

pub use builder::OrchestratorBuilder;
pub use config::OrchestratorConfig;
pub use orchestrator::Orchestrator;
