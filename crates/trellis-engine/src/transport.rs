//! The outbound seam between the engine and a client connection.
//!
//! A transport enqueues one [`ServerMessage`] for one socket; the
//! gateway's writer task drains the queue in order, so per-socket FIFO
//! holds. `send` is synchronous: it either enqueues or reports the
//! connection gone. The engine never retries a failed send — the
//! transport is dropped and the client reconciles on reconnect via a
//! fresh join snapshot.

use std::sync::Arc;

use trellis_protocol::ServerMessage;

/// The connection is gone; the transport will never deliver again.
#[derive(Debug, thiserror::Error)]
#[error("transport closed")]
pub struct TransportClosed;

/// Outbound message sink for one participant's connection.
pub trait ParticipantTransport: Send + Sync {
    /// Enqueue a message for delivery. FIFO per transport.
    ///
    /// # Errors
    ///
    /// Returns [`TransportClosed`] when the connection is gone.
    fn send(&self, message: ServerMessage) -> Result<(), TransportClosed>;
}

/// Shared handle to a participant transport.
pub type SharedTransport = Arc<dyn ParticipantTransport>;
