//! Error types for the conversation store.

use thiserror::Error;

use crate::conversation::core::ids::SessionId;

/// Conversation store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The session has no live record (never existed, deleted, or expired).
    #[error("session not found: {0}")]
    NotFound(SessionId),
    /// Generic backend failure.
    #[error("backend error: {0}")]
    Backend(String),
    /// Redis backend error.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    /// A persisted record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Invalid store configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    /// Whether this error means the session is absent rather than the backend failing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Convenience result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
