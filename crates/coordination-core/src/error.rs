//! Exceptional error cases.
//!
//! Only conditions that abort an operation live here. The non-exceptional
//! unsuccessful outcomes (a lock already held, a race lost, a caller that
//! isn't the owner, a missing record) are modeled as variants of the
//! per-operation outcome enums in `crate::coordination`, not as `Err` — see
//! those modules for the "two arm" result shape.

use thiserror::Error;

/// Errors that abort a coordination operation outright.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend could not be reached or returned a transport-level failure.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A caller-supplied argument was structurally invalid (e.g. an unknown
    /// branch context resolved for the `work` token).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Something went wrong that isn't one of the above and isn't the
    /// caller's fault (serialization bug, invariant violation).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Self::BackendUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization failure: {err}"))
    }
}
