//! Engine error type
//!
//! Every caller-facing operation returns [`MemoryError`]. Collaborator errors
//! (embedding provider, persistent store) are wrapped so callers can tell a
//! rejected request apart from a degraded dependency.

use crate::embeddings::EmbeddingError;
use crate::storage::StorageError;

/// Memory engine error
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Input rejected; every violation is listed
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    /// No memory with this id
    #[error("Memory not found: {0}")]
    NotFound(String),
    /// Vector length does not match the index dimension
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Dimension the index was built with
        expected: usize,
        /// Dimension that was supplied
        got: usize,
    },
    /// Vector produced by a different embedding model
    #[error("Model mismatch: expected {expected}, got {got}")]
    ModelMismatch {
        /// Model the index was built with
        expected: String,
        /// Model that was supplied
        got: String,
    },
    /// Embedding provider failed or timed out
    #[error("Embedding provider error: {0}")]
    Provider(#[from] EmbeddingError),
    /// Persistent store failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] StorageError),
    /// Deadline elapsed before the operation finished
    #[error("Operation cancelled: {0}")]
    Cancelled(String),
    /// Poisoned lock or broken internal state
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MemoryError {
    /// Shorthand for a single-violation validation error
    pub fn invalid(message: impl Into<String>) -> Self {
        MemoryError::Validation(vec![message.into()])
    }

    /// Whether retrying the same call later may succeed.
    ///
    /// Validation, not-found and mismatch errors are permanent for the given
    /// input; provider hiccups, deadlines and store failures are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MemoryError::Provider(_) | MemoryError::Persistence(_) | MemoryError::Cancelled(_)
        )
    }
}

/// Engine result type
pub type Result<T> = std::result::Result<T, MemoryError>;
