//! Error types used by the grainvisor runtime and grain handlers.
//!
//! - [`RuntimeError`]: failures of the orchestrator runtime itself.
//! - [`GrainError`]: failures of one handler step.
//!
//! Admission/terminate errors live next to the scheduler
//! ([`AdmissionError`](crate::AdmissionError), [`TerminateError`](crate::TerminateError)),
//! checkpoint errors next to the store ([`CheckpointError`](crate::CheckpointError)).
//! Every type provides a stable `as_label` for logs.

use std::time::Duration;

use thiserror::Error;

use crate::grains::{HasResultCode, ResultCode};

/// # Errors produced by the grainvisor runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some grains were still executing.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Ids of grains that did not stop in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use grainvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}

/// # Errors produced by a handler step.
///
/// `Timeout` and `Fail` are transient and retried per the grain's
/// [`ResiliencePolicy`](crate::ResiliencePolicy); `Fatal` and `Canceled` are not.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrainError {
    /// Step exceeded the per-attempt timeout.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Non-retriable failure.
    #[error("fatal error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Transient failure; the step may succeed if retried.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Handler observed cancellation and stopped.
    #[error("context cancelled")]
    Canceled,
}

impl GrainError {
    /// Shorthand for [`GrainError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        GrainError::Fail {
            error: error.into(),
        }
    }

    /// Shorthand for [`GrainError::Fatal`].
    pub fn fatal(error: impl Into<String>) -> Self {
        GrainError::Fatal {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use grainvisor::GrainError;
    /// use std::time::Duration;
    ///
    /// let err = GrainError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "grain_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            GrainError::Timeout { .. } => "grain_timeout",
            GrainError::Fatal { .. } => "grain_fatal",
            GrainError::Fail { .. } => "grain_failed",
            GrainError::Canceled => "grain_canceled",
        }
    }

    /// Indicates whether the error is safe to retry.
    ///
    /// # Example
    /// ```
    /// use grainvisor::GrainError;
    ///
    /// assert!(GrainError::fail("boom").is_retryable());
    /// assert!(!GrainError::fatal("nope").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, GrainError::Fail { .. } | GrainError::Timeout { .. })
    }
}

impl HasResultCode for GrainError {
    fn result_code(&self) -> ResultCode {
        match self {
            GrainError::Canceled => ResultCode::Cancelled,
            _ => ResultCode::Error,
        }
    }
}
