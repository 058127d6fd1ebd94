//! # Event subscribers.
//!
//! ```text
//! GrainActor / Orchestrator ── publish(Event) ──► Bus ──► subscriber listener
//!                                                              │
//!                                                       SubscriberSet::emit
//!                                                    ┌─────────┼─────────┐
//!                                                    ▼         ▼         ▼
//!                                                LogWriter   Push     Custom
//! ```
//!
//! - [`Subscribe`]: the extension point (remote transport, metrics, audit).
//! - [`SubscriberSet`]: bounded per-subscriber queues with panic isolation.
//! - [`LogWriter`]: built-in `tracing` renderer.

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
