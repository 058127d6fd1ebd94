//! # Events emitted by the orchestrator and grain actors.
//!
//! [`EventKind`] splits into two families:
//! - **Lifecycle** (`OnBegin`, `OnNext`, `OnError`, `OnCompleted`): the
//!   per-grain stream delivered to [`GrainStream`](crate::GrainStream)s.
//! - **Diagnostic** (attempt failures, backoff, subscriber faults, shutdown):
//!   carried on the same bus for observers and logging.
//!
//! Per grain, lifecycle events are strictly ordered:
//! ```text
//! OnBegin ─► OnNext* ─► [OnError] ─► OnCompleted
//! ```
//! Grains that never run (cancelled before start, skipped) emit only `OnCompleted`.
//!
//! ## Ordering guarantees
//! Every event takes a globally unique, monotonically increasing `seq` at
//! construction. Use `seq` to restore order after delivery through independent
//! channels.
//!
//! ## Example
//! ```rust
//! use grainvisor::{Event, EventKind, ResultCode, Stage};
//!
//! let ev = Event::new(EventKind::OnCompleted)
//!     .with_grain("invoice-42")
//!     .with_stage(Stage::Failed)
//!     .with_result_code(ResultCode::Error)
//!     .with_reason("boom");
//!
//! assert!(ev.is_terminal());
//! assert_eq!(ev.grain_id.as_deref(), Some("invoice-42"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use serde_json::{Value, json};

use crate::grains::{ResultCode, Stage};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of orchestrator events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Grain lifecycle ===
    /// Grain entered `Running` for this lifecycle (exactly once).
    ///
    /// Sets: `grain_id`, `client_key`, `stage`, `attempt`
    OnBegin,

    /// Durable checkpoint persisted, or the grain succeeded and its chain advanced.
    ///
    /// Sets: `grain_id`, `client_key`, `stage`, `step` (checkpoint only),
    /// `result_code` + `payload` (chain advance only)
    OnNext,

    /// Grain failed. Always followed by `OnCompleted`.
    ///
    /// Sets: `grain_id`, `client_key`, `stage`, `result_code`, `reason`, `payload`
    OnError,

    /// Terminal event (exactly once per lifecycle, every terminal stage).
    ///
    /// Sets: `grain_id`, `client_key`, `stage`, `result_code`, `payload`
    OnCompleted,

    // === Execution diagnostics ===
    /// One attempt of a step failed.
    ///
    /// Sets: `grain_id`, `attempt`, `step`, `reason`
    AttemptFailed,

    /// One attempt exceeded the per-attempt timeout.
    ///
    /// Sets: `grain_id`, `attempt`, `step`, `timeout_ms`
    TimeoutHit,

    /// Next attempt scheduled after a transient failure.
    ///
    /// Sets: `grain_id`, `attempt` (the failed one), `step`, `delay_ms`, `reason`
    BackoffScheduled,

    // === Subscriber diagnostics ===
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `reason` (`subscriber=<name> reason=<full|closed>`)
    SubscriberOverflow,

    /// Subscriber panicked during event processing.
    ///
    /// Sets: `reason` (panic message)
    SubscriberPanicked,

    // === Shutdown ===
    /// Shutdown requested (OS signal observed).
    ShutdownRequested,

    /// Every executing grain stopped within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded.
    ///
    /// Sets: `reason` (comma-separated stuck grain ids)
    GraceExceeded,
}

impl EventKind {
    /// Returns true for the four per-grain stream kinds.
    #[inline]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::OnBegin | Self::OnNext | Self::OnError | Self::OnCompleted
        )
    }

    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::OnBegin => "on_begin",
            Self::OnNext => "on_next",
            Self::OnError => "on_error",
            Self::OnCompleted => "on_completed",
            Self::AttemptFailed => "attempt_failed",
            Self::TimeoutHit => "timeout_hit",
            Self::BackoffScheduled => "backoff_scheduled",
            Self::SubscriberOverflow => "subscriber_overflow",
            Self::SubscriberPanicked => "subscriber_panicked",
            Self::ShutdownRequested => "shutdown_requested",
            Self::AllStoppedWithin => "all_stopped_within",
            Self::GraceExceeded => "grace_exceeded",
        }
    }
}

/// Orchestrator event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    pub grain_id: Option<Arc<str>>,
    /// Caller correlation key of the grain.
    pub client_key: Option<Arc<str>>,
    /// Stage of the grain when the event was emitted.
    pub stage: Option<Stage>,
    pub result_code: Option<ResultCode>,
    /// Opaque response payload.
    pub payload: Option<Arc<Value>>,

    /// Lifetime attempt counter (starting from 1).
    pub attempt: Option<u32>,
    /// Checkpointed step count.
    pub step: Option<u32>,
    /// Backoff delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Attempt timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Human-readable reason (errors, overflow details, stuck ids).
    pub reason: Option<Arc<str>>,

    /// True when delivered from the replay cache to a late subscriber.
    pub replayed: bool,
}

impl Event {
    /// Creates an event of the given kind with the current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            grain_id: None,
            client_key: None,
            stage: None,
            result_code: None,
            payload: None,
            attempt: None,
            step: None,
            delay_ms: None,
            timeout_ms: None,
            reason: None,
            replayed: false,
        }
    }

    #[inline]
    pub fn with_grain(mut self, id: impl Into<Arc<str>>) -> Self {
        self.grain_id = Some(id.into());
        self
    }

    #[inline]
    pub fn with_client_key(mut self, key: Option<Arc<str>>) -> Self {
        self.client_key = key;
        self
    }

    #[inline]
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    #[inline]
    pub fn with_result_code(mut self, code: ResultCode) -> Self {
        self.result_code = Some(code);
        self
    }

    #[inline]
    pub fn with_payload(mut self, payload: Option<Value>) -> Self {
        self.payload = payload.map(Arc::new);
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    #[inline]
    pub fn with_step(mut self, step: u32) -> Self {
        self.step = Some(step);
        self
    }

    /// Attaches a backoff delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Attaches an attempt timeout (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(compact_ms(d));
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} panic={info}"))
    }

    /// Returns true for the event that closes a grain's stream.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::OnCompleted)
    }

    /// Sequence number the next event will get.
    pub(crate) fn next_seq() -> u64 {
        EVENT_SEQ.load(AtomicOrdering::Relaxed)
    }

    /// Copy of this event marked as replayed (same `seq`).
    pub(crate) fn replay(&self) -> Self {
        let mut ev = self.clone();
        ev.replayed = true;
        ev
    }

    /// Wire form handed to remote transports:
    /// `{kind, seq, grain_id, client_key, stage, result_code, payload?}`.
    pub fn to_payload(&self) -> Value {
        let mut out = json!({
            "kind": self.kind.as_label(),
            "seq": self.seq,
            "grain_id": self.grain_id.as_deref(),
            "client_key": self.client_key.as_deref(),
            "stage": self.stage,
            "result_code": self.result_code.map(|c| c.as_i32()),
        });
        if let (Some(payload), Some(obj)) = (&self.payload, out.as_object_mut()) {
            obj.insert("payload".to_string(), (**payload).clone());
        }
        out
    }
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}
