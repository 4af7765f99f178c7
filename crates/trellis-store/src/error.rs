//! Store error types.

/// Errors from durable-store and warm-cache operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested room does not exist.
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// Connection to the storage backend failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// A query against the backend failed.
    #[error("query error: {0}")]
    Query(String),

    /// Serialization or deserialization of a stored blob failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
