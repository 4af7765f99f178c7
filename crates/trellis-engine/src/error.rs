//! Engine error taxonomy.

use trellis_store::StoreError;

/// Errors surfaced by room operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The credential could not be resolved to a principal.
    #[error("authentication failed")]
    AuthFailed,

    /// The principal has no access to the room.
    #[error("access denied")]
    AccessDenied,

    /// The room does not exist in the durable store.
    #[error("room not found")]
    RoomNotFound,

    /// An operation exceeded its budget.
    #[error("{operation} timed out after {ms}ms")]
    Timeout {
        /// What timed out.
        operation: &'static str,
        /// The budget that was exceeded.
        ms: u64,
    },

    /// The joining client's connection closed before the join landed.
    #[error("participant transport closed")]
    TransportClosed,

    /// A storage tier failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The room's controller has shut down.
    #[error("room controller closed")]
    ControllerClosed,
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
