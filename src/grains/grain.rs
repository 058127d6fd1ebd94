//! # Grain: one submitted unit of work.
//!
//! A [`Grain`] carries its immutable identity (id, type, chain membership,
//! dependencies) and its execution settings (durability, delay, resilience).
//! Mutable execution state (stage, result) lives in the scheduler, never here.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use grainvisor::Grain;
//!
//! let g = Grain::new("invoice-42", "render_pdf")
//!     .with_chain("tenant-7")
//!     .with_delay(Duration::from_millis(250))
//!     .durable()
//!     .with_payload(serde_json::json!({ "invoice": 42 }));
//!
//! assert_eq!(g.id(), "invoice-42");
//! assert!(g.is_durable());
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::policies::ResiliencePolicy;

/// Specification of a unit of work.
#[derive(Clone, Debug)]
pub struct Grain {
    id: Arc<str>,
    type_name: String,
    chain_key: Option<String>,
    client_key: Option<Arc<str>>,
    depends_on: Vec<String>,
    durable: bool,
    delay: Duration,
    resilience: Option<ResiliencePolicy>,
    payload: Arc<Value>,
}

impl Grain {
    /// Creates a grain with no chain, no dependencies and a `null` payload.
    pub fn new(id: impl Into<Arc<str>>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            chain_key: None,
            client_key: None,
            depends_on: Vec::new(),
            durable: false,
            delay: Duration::ZERO,
            resilience: None,
            payload: Arc::new(Value::Null),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn id_arc(&self) -> Arc<str> {
        Arc::clone(&self.id)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn chain_key(&self) -> Option<&str> {
        self.chain_key.as_deref()
    }

    pub fn client_key(&self) -> Option<&Arc<str>> {
        self.client_key.as_ref()
    }

    /// Declared dependencies in declaration order.
    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Per-grain resilience override (`None` = orchestrator default).
    pub fn resilience(&self) -> Option<ResiliencePolicy> {
        self.resilience
    }

    pub fn payload(&self) -> &Arc<Value> {
        &self.payload
    }

    /// Places the grain in a chain; members of a chain run in submission order.
    pub fn with_chain(mut self, chain_key: impl Into<String>) -> Self {
        self.chain_key = Some(chain_key.into());
        self
    }

    /// Correlation key copied into every event of this grain.
    pub fn with_client_key(mut self, client_key: impl Into<Arc<str>>) -> Self {
        self.client_key = Some(client_key.into());
        self
    }

    /// Adds a dependency (duplicates are ignored, order is kept).
    pub fn depends_on_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !self.depends_on.contains(&id) {
            self.depends_on.push(id);
        }
        self
    }

    /// Replaces the dependency list (duplicates are dropped, first occurrence kept).
    pub fn with_depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.clear();
        for id in ids {
            self = self.depends_on_id(id);
        }
        self
    }

    /// Marks the grain durable: every step is checkpointed.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    pub fn with_durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_resilience(mut self, resilience: ResiliencePolicy) -> Self {
        self.resilience = Some(resilience);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Arc::new(payload);
        self
    }

    /// Sets the implicit chain predecessor when no dependency was declared.
    pub(crate) fn link_predecessor(&mut self, predecessor: &str) {
        if self.depends_on.is_empty() {
            self.depends_on.push(predecessor.to_string());
        }
    }
}
