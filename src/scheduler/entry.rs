use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::grains::{Grain, ResultCode, Stage};

/// One row of the scheduler table.
pub(super) struct Entry {
    pub grain: Grain,
    pub stage: Stage,
    /// Submission order; FIFO tie-break among grains released together.
    pub seq: u64,
    /// Set once an actor is spawned for the grain.
    pub token: Option<CancellationToken>,
    pub code: ResultCode,
    pub finished_at: Option<Instant>,
    /// A `Delayed` grain whose delay elapsed while a dependency was pending.
    pub delay_elapsed: bool,
}

impl Entry {
    pub fn new(grain: Grain, stage: Stage, seq: u64) -> Self {
        Self {
            grain,
            stage,
            seq,
            token: None,
            code: ResultCode::Unknown,
            finished_at: None,
            delay_elapsed: false,
        }
    }

    /// Still waiting to be admitted (delay or dependencies).
    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self.stage, Stage::Seeded | Stage::Delayed)
    }

    /// Past admission and blocked only by dependencies.
    #[inline]
    pub fn awaits_dependencies(&self) -> bool {
        match self.stage {
            Stage::Seeded => true,
            Stage::Delayed => self.delay_elapsed,
            _ => false,
        }
    }

    #[inline]
    pub fn waits_on(&self, dep: &str) -> bool {
        self.grain.depends_on().iter().any(|d| d == dep)
    }

    /// Moves to a terminal stage. Returns false if the transition is not allowed.
    pub fn finish(&mut self, stage: Stage, code: ResultCode, now: Instant) -> bool {
        if !self.stage.can_transition_to(stage) || !stage.is_terminal() {
            return false;
        }
        self.stage = stage;
        self.code = code;
        self.token = None;
        self.finished_at = Some(now);
        true
    }

    pub fn settled(&self) -> Settled {
        Settled {
            id: self.grain.id_arc(),
            client_key: self.grain.client_key().cloned(),
            stage: self.stage,
            code: self.code,
        }
    }
}

/// A grain that reached a terminal stage without running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    pub id: Arc<str>,
    pub client_key: Option<Arc<str>>,
    pub stage: Stage,
    pub code: ResultCode,
}
