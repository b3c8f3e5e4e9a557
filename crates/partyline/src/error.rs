//! Unified error type for Partyline.

use partyline_protocol::ProtocolError;
use partyline_room::RoomError;
use partyline_session::SessionError;
use partyline_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls,
/// so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum PartylineError {
    /// A transport-level error (bind, send, recv, idle timeout).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (duplicate or unknown connection).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error. Only fatal ones reach this far.
    #[error(transparent)]
    Room(#[from] RoomError),
}
