//! # Grain execution stages.
//!
//! ```text
//! Seeded ──► (Delayed) ──► Queued ──► Running ⇄ Checkpointed
//!    │           │           │           │
//!    │           │           │           ├─► Succeeded
//!    │           │           │           ├─► Failed
//!    └───────────┴───────────┴───────────┴─► Cancelled
//!    └───────────┴───────────┴─────────────► SkippedDueToDependency
//! ```
//!
//! A delayed grain whose delay elapsed while a dependency is pending stays
//! `Delayed` until the dependency settles. Stages never move backwards, except
//! `Running ⇄ Checkpointed`. Terminal stages are final.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Execution stage of a grain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Accepted, not yet eligible (dependencies pending).
    #[default]
    Seeded,
    /// Held by the delay gate, or past its delay with a dependency pending.
    Delayed,
    /// Every dependency succeeded; eligible to run.
    Queued,
    /// An execution attempt is in flight.
    Running,
    /// A durable step was persisted; the next step is about to start.
    Checkpointed,
    /// Finished with `Success` or `Warning`.
    Succeeded,
    /// Finished with an error result or an execution fault.
    Failed,
    /// Terminated on request (or timed out of existence by shutdown).
    Cancelled,
    /// A dependency failed, was cancelled, or never existed.
    SkippedDueToDependency,
}

impl Stage {
    /// Returns true if no further transition is accepted.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Cancelled | Self::SkippedDueToDependency
        )
    }

    /// Returns true while an execution attempt owns the grain.
    #[must_use]
    pub const fn is_executing(&self) -> bool {
        matches!(self, Self::Running | Self::Checkpointed)
    }

    /// Returns true if this stage unblocks dependents.
    #[must_use]
    pub const fn unblocks_dependents(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns true if the transition from self to target is valid.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        match self {
            Self::Seeded => matches!(
                target,
                Self::Delayed | Self::Queued | Self::Cancelled | Self::SkippedDueToDependency
            ),
            Self::Delayed => matches!(
                target,
                Self::Queued | Self::Cancelled | Self::SkippedDueToDependency
            ),
            Self::Queued => matches!(
                target,
                Self::Running | Self::Cancelled | Self::SkippedDueToDependency
            ),
            Self::Running => matches!(
                target,
                Self::Checkpointed | Self::Succeeded | Self::Failed | Self::Cancelled
            ),
            Self::Checkpointed => matches!(
                target,
                Self::Running | Self::Succeeded | Self::Failed | Self::Cancelled
            ),
            Self::Succeeded | Self::Failed | Self::Cancelled | Self::SkippedDueToDependency => {
                false
            }
        }
    }

    /// Returns a lowercase label suitable for logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Seeded => "seeded",
            Self::Delayed => "delayed",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Checkpointed => "checkpointed",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::SkippedDueToDependency => "skipped_due_to_dependency",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}
