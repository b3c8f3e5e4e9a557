//! A single live connection as the server sees it.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use partyline_protocol::{RoomCode, ServerMessage};
use partyline_transport::ConnectionId;
use tokio::sync::mpsc;

/// Outbound queue for one connection.
///
/// Unbounded so that room logic never waits on a slow socket. The
/// connection's writer task drains the other end.
pub type PeerSender = mpsc::UnboundedSender<ServerMessage>;

/// The server's record of one open connection.
///
/// A session exists from the moment a socket is accepted until it
/// closes. It holds no player identity: which player a connection
/// speaks for is the room layer's business.
#[derive(Debug, Clone)]
pub struct Session {
    /// The connection this session belongs to.
    pub connection: ConnectionId,

    /// Where messages for this connection are queued.
    pub sender: PeerSender,

    /// Room channels this connection currently receives broadcasts from.
    pub channels: HashSet<RoomCode>,

    /// When the session was opened.
    pub connected_at: Instant,
}

impl Session {
    pub fn new(connection: ConnectionId, sender: PeerSender) -> Self {
        Self {
            connection,
            sender,
            channels: HashSet::new(),
            connected_at: Instant::now(),
        }
    }

    /// How long the session has been open.
    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Queues a message. Returns `false` if the writer side is gone,
    /// which just means the socket is on its way out.
    pub fn send(&self, msg: ServerMessage) -> bool {
        self.sender.send(msg).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_starts_empty_and_ages() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = Session::new(ConnectionId::new(1), tx);
        assert!(session.channels.is_empty());

        std::thread::sleep(Duration::from_millis(5));
        assert!(session.connected_for() >= Duration::from_millis(5));

        rx.close();
        assert!(!session.send(ServerMessage::Error {
            code: 500,
            message: "gone".into(),
        }));
    }
}
