//! Store error types.

use thiserror::Error;

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No row exists under the requested key.
    #[error("not found: {0}")]
    NotFound(String),

    /// `create` was called for a key that already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A value failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backend failed; treated as transient and retryable.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns whether the error indicates an absent row.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns whether the error indicates a key collision on create.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
