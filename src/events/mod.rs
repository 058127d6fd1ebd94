//! Orchestrator events: data model, broadcast bus, replay cache and streams.
//!
//! ## Contents
//! - [`EventKind`], [`Event`]: classification and metadata
//! - [`Bus`]: thin wrapper over `tokio::sync::broadcast`
//! - [`LatestTracker`]: latest lifecycle event per grain (late-subscriber replay)
//! - [`Topic`], [`GrainStream`]: filtered per-grain / per-client streams
//!
//! ## Quick reference
//! - **Publishers**: `GrainActor`, `Orchestrator` (terminal and skip events,
//!   shutdown), `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the orchestrator's subscriber listener (fans out to
//!   `SubscriberSet`), `GrainStream` forwarders, raw `Bus::subscribe` receivers.

mod bus;
mod event;
mod latest;
mod publisher;
mod stream;

pub use bus::Bus;
pub use event::{Event, EventKind};
pub use latest::LatestTracker;
pub(crate) use publisher::Publisher;
pub use stream::{GrainStream, Topic};
