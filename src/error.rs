// src/error.rs
//
// Crate-wide error type for all public fallible operations.
//
// The expression grammar (src/expr.rs) keeps its own small error type —
// it is the one place the design calls out as a dedicated, localised
// exception to this enum.

use thiserror::Error;

/// Result alias used throughout the public API.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by public engine operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    #[error("stale: {0}")]
    Stale(String),

    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    #[error("migration failed: {0}")]
    MigrationFailed(String),

    #[error("command queue full")]
    QueueFull,

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
}
