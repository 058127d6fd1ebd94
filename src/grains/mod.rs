//! # Grain model, handlers and the handler registry.
//!
//! - [`Grain`] - specification of one unit of work
//! - [`GrainRequest`] - JSON submission shape
//! - [`Stage`] - execution stage state machine
//! - [`ResultCode`], [`GrainResult`] - outcome classification and response
//! - [`Handler`], [`HandlerFn`], [`HandlerRef`] - step-wise business logic
//! - [`HandlerRegistry`] - type name → handler factory

mod grain;
mod handler;
mod handler_fn;
mod registry;
mod request;
mod result;
mod stage;

pub use grain::Grain;
pub use handler::{Handler, HandlerRef, Step, StepContext};
pub use handler_fn::HandlerFn;
pub use registry::{HandlerFactory, HandlerRegistry, RegistryError};
pub use request::GrainRequest;
pub use result::{GrainResult, HasResultCode, ResultCode};
pub use stage::Stage;
