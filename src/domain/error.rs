//! Domain-level errors (no external dependencies)

use thiserror::Error;

/// Domain errors represent rejected operations.
/// They are raised before any write happens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("id already in use: {0}")]
    IdOccupied(String),

    #[error("old and new id are identical: {0}")]
    SameId(String),

    #[error("invalid id {id:?}: {reason}")]
    InvalidId { id: String, reason: String },
}
