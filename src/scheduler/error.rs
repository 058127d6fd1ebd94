use thiserror::Error;

use crate::grains::{HasResultCode, ResultCode};

/// Synchronous rejection of a submission.
///
/// Returned by [`Orchestrator::submit`](crate::Orchestrator::submit) before the
/// grain enters any queue. Every variant except `Closed` is `InvalidObject`.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// Grain id is empty.
    #[error("grain id is empty")]
    EmptyId,

    /// A grain with this id exists and has not reached a terminal stage.
    #[error("grain '{id}' already exists and is not terminal")]
    Duplicate { id: String },

    /// No handler is registered for the grain type.
    #[error("no handler registered for type '{type_name}'")]
    UnknownType { type_name: String },

    /// Explicit dependencies belong to two different chains.
    #[error("grain '{id}' depends on chains '{first}' and '{second}'")]
    CrossChainDependency {
        id: String,
        first: String,
        second: String,
    },

    /// Grain lists itself in `depends_on`.
    #[error("grain '{id}' depends on itself")]
    SelfDependency { id: String },

    /// A dependency (directly or transitively) waits on this grain.
    #[error("grain '{id}' closes a dependency cycle through '{through}'")]
    Cycle { id: String, through: String },

    /// JSON submission could not be parsed.
    #[error("malformed submission: {reason}")]
    Malformed { reason: String },

    /// The orchestrator is shutting down.
    #[error("orchestrator is shutting down")]
    Closed,
}

impl AdmissionError {
    pub fn as_label(&self) -> &'static str {
        match self {
            AdmissionError::EmptyId => "admission_empty_id",
            AdmissionError::Duplicate { .. } => "admission_duplicate",
            AdmissionError::UnknownType { .. } => "admission_unknown_type",
            AdmissionError::CrossChainDependency { .. } => "admission_cross_chain",
            AdmissionError::SelfDependency { .. } => "admission_self_dependency",
            AdmissionError::Cycle { .. } => "admission_cycle",
            AdmissionError::Malformed { .. } => "admission_malformed",
            AdmissionError::Closed => "admission_closed",
        }
    }
}

impl HasResultCode for AdmissionError {
    fn result_code(&self) -> ResultCode {
        match self {
            AdmissionError::Closed => ResultCode::Error,
            _ => ResultCode::InvalidObject,
        }
    }
}

/// Returned by [`Orchestrator::terminate`](crate::Orchestrator::terminate).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TerminateError {
    /// Unknown id, or the grain is already terminal.
    #[error("nothing to terminate for grain '{id}'")]
    NotFound { id: String },
}

impl TerminateError {
    pub fn as_label(&self) -> &'static str {
        match self {
            TerminateError::NotFound { .. } => "terminate_not_found",
        }
    }
}

impl HasResultCode for TerminateError {
    fn result_code(&self) -> ResultCode {
        ResultCode::InvalidObject
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_codes() {
        let dup = AdmissionError::Duplicate { id: "a".into() };
        assert_eq!(dup.result_code(), ResultCode::InvalidObject);
        assert_eq!(AdmissionError::Closed.result_code(), ResultCode::Error);
        assert_eq!(
            ResultCode::of(&Err::<(), _>(AdmissionError::EmptyId)),
            ResultCode::InvalidObject
        );
        assert_eq!(ResultCode::of(&Ok::<(), AdmissionError>(())), ResultCode::Success);
    }
}
