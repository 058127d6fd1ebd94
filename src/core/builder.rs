use std::sync::Arc;

use crate::{
    checkpoint::{CheckpointStore, MemoryCheckpointStore},
    core::{config::OrchestratorConfig, orchestrator::Orchestrator},
    events::Bus,
    grains::HandlerRegistry,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for an [`Orchestrator`] with optional collaborators.
pub struct OrchestratorBuilder {
    cfg: OrchestratorConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    registry: Option<Arc<HandlerRegistry>>,
    store: Option<Arc<dyn CheckpointStore>>,
}

impl OrchestratorBuilder {
    pub fn new(cfg: OrchestratorConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            registry: None,
            store: None,
        }
    }

    /// Sets event subscribers.
    ///
    /// Each subscriber gets a dedicated worker with a bounded queue and sees
    /// every event on the bus, diagnostics included.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Shares an existing handler registry (default: a fresh, empty one).
    pub fn with_registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the checkpoint store (default: [`MemoryCheckpointStore`]).
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the orchestrator and starts its background loops.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Arc<Orchestrator> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let registry = self.registry.unwrap_or_default();
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryCheckpointStore::new()));

        let orch = Arc::new(Orchestrator::new_internal(
            self.cfg, bus, subs, registry, store,
        ));
        orch.start_background();
        orch
    }
}
