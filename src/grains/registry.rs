//! # Handler registry.
//!
//! Maps a logical `type_name` to a [`HandlerFactory`]. The orchestrator
//! resolves the type of every submitted grain here before it reaches the
//! scheduler; an unknown type is rejected with `InvalidObject`.
//!
//! ## Rules
//! - Registration is idempotent per type name: registering again replaces the
//!   factory (**last write wins**) and bumps the type's revision.
//! - Grains that already resolved their handler keep that instance; only later
//!   resolutions observe the replacement.
//! - Loading handlers from an external plugin store is the caller's business;
//!   such a loader calls [`HandlerRegistry::register`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tracing::{debug, info};

use crate::error::GrainError;
use crate::grains::{HandlerFn, HandlerRef, Step, StepContext};

/// Builds handler instances for one grain type.
pub trait HandlerFactory: Send + Sync + 'static {
    fn create(&self) -> HandlerRef;
}

impl<F> HandlerFactory for F
where
    F: Fn() -> HandlerRef + Send + Sync + 'static,
{
    fn create(&self) -> HandlerRef {
        self()
    }
}

/// Registry lookup failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no handler registered for type '{type_name}'")]
    NotFound { type_name: String },
}

struct Registration {
    factory: Arc<dyn HandlerFactory>,
    revision: u64,
}

/// Type-name → factory map.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: RwLock<HashMap<String, Registration>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the factory for `type_name`; returns the new revision.
    pub fn register(&self, type_name: impl Into<String>, factory: impl HandlerFactory) -> u64 {
        let type_name = type_name.into();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let revision = entries.get(&type_name).map_or(1, |r| r.revision + 1);
        if revision > 1 {
            info!(%type_name, revision, "handler replaced");
        } else {
            debug!(%type_name, "handler registered");
        }
        entries.insert(
            type_name,
            Registration {
                factory: Arc::new(factory),
                revision,
            },
        );
        revision
    }

    /// Registers one shared handler instance for every grain of `type_name`.
    pub fn register_handler(&self, type_name: impl Into<String>, handler: HandlerRef) -> u64 {
        self.register(type_name, move || Arc::clone(&handler))
    }

    /// Registers a closure-backed handler.
    pub fn register_fn<F, Fut>(&self, type_name: impl Into<String>, f: F) -> u64
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Step, GrainError>> + Send + 'static,
    {
        self.register_handler(type_name, HandlerFn::arc(f))
    }

    /// Builds a handler for `type_name`.
    pub fn resolve(&self, type_name: &str) -> Result<HandlerRef, RegistryError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(type_name)
            .map(|r| r.factory.create())
            .ok_or_else(|| RegistryError::NotFound {
                type_name: type_name.to_string(),
            })
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(type_name)
    }

    /// Current revision of `type_name` (`None` if unknown).
    pub fn revision(&self, type_name: &str) -> Option<u64> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_name)
            .map(|r| r.revision)
    }

    /// Sorted list of registered type names.
    pub fn type_names(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = entries.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}
