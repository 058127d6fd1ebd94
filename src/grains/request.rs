//! # Wire form of a grain submission.
//!
//! Ingress layers hand the orchestrator JSON; [`GrainRequest`] is that shape.
//! Parsing failures surface as [`AdmissionError::Malformed`].
//!
//! ```json
//! { "id": "B", "type_name": "mail", "depends_on": ["A"], "delay_ms": 500,
//!   "is_durable": true, "payload": { "to": "ops@example.com" } }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::grains::Grain;
use crate::policies::ResiliencePolicy;
use crate::scheduler::AdmissionError;

/// JSON submission of one grain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrainRequest {
    pub id: String,
    pub type_name: String,
    #[serde(default)]
    pub chain_key: Option<String>,
    #[serde(default)]
    pub client_key: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub is_durable: bool,
    #[serde(default)]
    pub delay_ms: u64,
    /// Overrides the default retry count.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Overrides the default per-attempt timeout.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub payload: Value,
}

impl GrainRequest {
    /// Parses a request from JSON text.
    pub fn from_json(text: &str) -> Result<Self, AdmissionError> {
        serde_json::from_str(text).map_err(|e| AdmissionError::Malformed {
            reason: e.to_string(),
        })
    }

    /// Builds the grain, layering overrides on top of `defaults`.
    pub fn into_grain(self, defaults: ResiliencePolicy) -> Grain {
        let mut resilience = defaults;
        if let Some(n) = self.max_retries {
            resilience.max_retries = n;
        }
        if let Some(ms) = self.timeout_ms {
            resilience.timeout = Some(Duration::from_millis(ms));
        }
        let overridden = self.max_retries.is_some() || self.timeout_ms.is_some();

        let mut grain = Grain::new(self.id, self.type_name)
            .with_depends_on(self.depends_on)
            .with_durable(self.is_durable)
            .with_delay(Duration::from_millis(self.delay_ms))
            .with_payload(self.payload);
        if let Some(chain) = self.chain_key {
            grain = grain.with_chain(chain);
        }
        if let Some(client) = self.client_key {
            grain = grain.with_client_key(client);
        }
        if overridden {
            grain = grain.with_resilience(resilience);
        }
        grain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_request_uses_defaults() {
        let req = GrainRequest::from_json(r#"{"id":"A","type_name":"t"}"#).unwrap();
        let g = req.into_grain(ResiliencePolicy::default());
        assert_eq!(g.id(), "A");
        assert_eq!(g.delay(), Duration::ZERO);
        assert!(g.depends_on().is_empty());
        assert!(g.resilience().is_none());
        assert!(!g.is_durable());
    }

    #[test]
    fn overrides_are_applied() {
        let req = GrainRequest::from_json(
            r#"{"id":"B","type_name":"t","depends_on":["A"],"delay_ms":500,
                "max_retries":1,"timeout_ms":20,"chain_key":"c","client_key":"k"}"#,
        )
        .unwrap();
        let g = req.into_grain(ResiliencePolicy::default());
        assert_eq!(g.delay(), Duration::from_millis(500));
        assert_eq!(g.chain_key(), Some("c"));
        assert_eq!(g.client_key().map(|k| &**k), Some("k"));
        let r = g.resilience().unwrap();
        assert_eq!(r.max_retries, 1);
        assert_eq!(r.timeout, Some(Duration::from_millis(20)));
    }

    #[test]
    fn negative_delay_is_malformed() {
        let err = GrainRequest::from_json(r#"{"id":"A","type_name":"t","delay_ms":-5}"#);
        assert!(matches!(err, Err(AdmissionError::Malformed { .. })));
    }
}
