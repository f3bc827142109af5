//! Typed failures returned by the engine.
//!
//! None of these are transient; retrying with the same input reproduces the
//! same failure, so nothing is retried internally. The caller (CLI or an
//! API layer) translates them into user-visible messages.

use thiserror::Error;

/// Errors surfaced by the hierarchy guard, traversal, query engine and
/// stores.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Referenced task does not exist or is soft-deleted.
    #[error("task {0} not found")]
    NotFound(u64),

    /// The acting owner does not own the referenced task.
    #[error("not authorised to modify task {0}")]
    Unauthorized(u64),

    /// The request itself is invalid: self-parent, circular reference,
    /// depth exceeded, bad page/page size, unknown sort key, malformed
    /// date range, field bounds.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A cycle or unbounded depth was detected during traversal despite
    /// the guard. Indicates data corruption, not caller error.
    #[error("internal consistency violation: {0}")]
    InternalConsistency(String),

    /// Underlying storage failed to read or write.
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
