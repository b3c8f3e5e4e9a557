//! Error types for the session layer.

use partyline_transport::ConnectionId;

/// Errors that can occur while tracking connections.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A session is already open for this connection.
    /// Connection ids are never reused, so this points at a caller bug.
    #[error("session already open for {0}")]
    AlreadyOpen(ConnectionId),

    /// No session exists for the given connection. It was never opened,
    /// or it has already been closed.
    #[error("no session for {0}")]
    NotFound(ConnectionId),
}
