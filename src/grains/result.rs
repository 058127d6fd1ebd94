//! # Result codes and grain results.
//!
//! [`ResultCode`] is the coarse outcome classification shared by every
//! orchestrator-facing operation and every terminal event. [`GrainResult`]
//! pairs a code with the opaque response a handler produced.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse outcome classification.
///
/// Numeric values are stable and match the wire model (`Unknown = -1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ResultCode {
    #[default]
    Unknown = -1,
    Success = 0,
    /// Business-logic partial success. Counts as success for dependents.
    Warning = 1,
    InvalidObject = 2,
    Error = 3,
    Failed = 4,
    Cancelled = 5,
    Unauthorized = 6,
}

impl ResultCode {
    /// Returns true for `Success` and `Warning`.
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::Warning)
    }

    /// Returns the stable numeric value.
    #[inline]
    pub const fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// Returns the orchestrator-layer code of a call result.
    ///
    /// `Ok(_)` is `Success`; errors report their own code.
    pub fn of<T, E: HasResultCode>(res: &Result<T, E>) -> Self {
        match res {
            Ok(_) => Self::Success,
            Err(e) => e.result_code(),
        }
    }
}

impl TryFrom<i32> for ResultCode {
    type Error = i32;

    fn try_from(v: i32) -> Result<Self, i32> {
        Ok(match v {
            -1 => Self::Unknown,
            0 => Self::Success,
            1 => Self::Warning,
            2 => Self::InvalidObject,
            3 => Self::Error,
            4 => Self::Failed,
            5 => Self::Cancelled,
            6 => Self::Unauthorized,
            other => return Err(other),
        })
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Errors that classify themselves with a [`ResultCode`].
pub trait HasResultCode {
    fn result_code(&self) -> ResultCode;
}

/// Final response of a handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrainResult {
    pub code: ResultCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl GrainResult {
    pub fn new(code: ResultCode, payload: Option<Value>) -> Self {
        Self { code, payload }
    }

    /// `Success` with a response payload.
    pub fn success(payload: Value) -> Self {
        Self::new(ResultCode::Success, Some(payload))
    }

    /// `Warning` with a response payload.
    pub fn warning(payload: Value) -> Self {
        Self::new(ResultCode::Warning, Some(payload))
    }

    /// Bare result code without payload.
    pub fn code(code: ResultCode) -> Self {
        Self::new(code, None)
    }
}
