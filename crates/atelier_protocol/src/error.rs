//! Component-boundary error kinds.
//!
//! Every component surfaces one of these kinds; the HTTP layer owns the
//! mapping to status codes. Components never swallow `Upstream` errors -
//! they either retry locally or propagate.

use thiserror::Error;

/// Result alias for component boundaries.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Coarse error classification shared by all components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadInput,
    NotFound,
    Conflict,
    Upstream,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadInput => "bad_input",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Typed error carried across component boundaries.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Validation failed. Never retried.
    #[error("bad input: {0}")]
    BadInput(String),

    /// Requested entity missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// State-machine violation or unique constraint.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A collaborator (backend, LLM, index, store) is unreachable or
    /// returned a non-success after retries.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Wall-clock bound exceeded.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Invariant violated; names the invariant.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::BadInput(_) => ErrorKind::BadInput,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::Upstream(_) => ErrorKind::Upstream,
            CoreError::Timeout(_) => ErrorKind::Timeout,
            CoreError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn bad_input(msg: impl Into<String>) -> Self {
        Self::BadInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<crate::ids::IdParseError> for CoreError {
    fn from(e: crate::ids::IdParseError) -> Self {
        CoreError::BadInput(e.to_string())
    }
}
