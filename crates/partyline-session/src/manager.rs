//! The session manager: every open connection and the room channels
//! they listen on.
//!
//! # Concurrency note
//!
//! `SessionManager` is NOT thread-safe by itself. It is owned by the
//! lobby task (see `partyline-room`) and only touched from there, so
//! membership changes and broadcasts are naturally serialized.

use std::collections::{HashMap, HashSet};

use partyline_protocol::{Recipient, RoomCode, ServerMessage};
use partyline_transport::ConnectionId;

use crate::{PeerSender, Session, SessionError};

/// Registry of open connections plus a channel index keyed by room code.
///
/// ## Lifecycle
///
/// ```text
/// open() ──→ subscribe(room) ──→ broadcast(room, ..) ──→ close()
///                 │                                        │
///                 └──────── unsubscribe(room) ◀────────────┘
///                           (close drops every channel)
/// ```
///
/// Both maps are kept in sync: a connection listed under a channel
/// always has that channel in its [`Session::channels`].
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<ConnectionId, Session>,
    channels: HashMap<RoomCode, HashSet<ConnectionId>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly accepted connection.
    ///
    /// # Errors
    /// Returns [`SessionError::AlreadyOpen`] if the id is already known.
    pub fn open(&mut self, connection: ConnectionId, sender: PeerSender) -> Result<(), SessionError> {
        if self.sessions.contains_key(&connection) {
            return Err(SessionError::AlreadyOpen(connection));
        }
        self.sessions
            .insert(connection, Session::new(connection, sender));
        tracing::debug!(%connection, "session opened");
        Ok(())
    }

    /// Forgets a connection and removes it from every channel.
    ///
    /// Returns the closed session, or `None` if it was not open.
    pub fn close(&mut self, connection: ConnectionId) -> Option<Session> {
        let session = self.sessions.remove(&connection)?;
        for code in &session.channels {
            self.detach(code, connection);
        }
        tracing::debug!(
            %connection,
            channels = session.channels.len(),
            connected_ms = session.connected_for().as_millis() as u64,
            "session closed"
        );
        Some(session)
    }

    /// Adds a connection to a room channel.
    ///
    /// Returns `Ok(false)` if it was already subscribed.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] if the connection is not open.
    pub fn subscribe(&mut self, connection: ConnectionId, code: &RoomCode) -> Result<bool, SessionError> {
        let session = self
            .sessions
            .get_mut(&connection)
            .ok_or(SessionError::NotFound(connection))?;
        if !session.channels.insert(code.clone()) {
            return Ok(false);
        }
        self.channels
            .entry(code.clone())
            .or_default()
            .insert(connection);
        Ok(true)
    }

    /// Removes a connection from a room channel.
    ///
    /// Returns `true` if it was subscribed.
    pub fn unsubscribe(&mut self, connection: ConnectionId, code: &RoomCode) -> bool {
        let Some(session) = self.sessions.get_mut(&connection) else {
            return false;
        };
        if !session.channels.remove(code) {
            return false;
        }
        self.detach(code, connection);
        true
    }

    /// Drops a whole channel, unsubscribing everyone on it.
    ///
    /// Used when a room is deleted. Returns how many connections were
    /// subscribed.
    pub fn close_channel(&mut self, code: &RoomCode) -> usize {
        let Some(members) = self.channels.remove(code) else {
            return 0;
        };
        for connection in &members {
            if let Some(session) = self.sessions.get_mut(connection) {
                session.channels.remove(code);
            }
        }
        members.len()
    }

    // -- Delivery ---------------------------------------------------------

    /// Queues a message for one connection. Returns `false` if the
    /// connection is unknown or its writer has gone away.
    pub fn send_to(&self, connection: ConnectionId, msg: ServerMessage) -> bool {
        match self.sessions.get(&connection) {
            Some(session) => session.send(msg),
            None => {
                tracing::trace!(%connection, "dropping message for closed connection");
                false
            }
        }
    }

    /// Queues a message for every subscriber of `code`.
    ///
    /// Returns the number of connections it was queued for.
    pub fn broadcast(&self, code: &RoomCode, msg: &ServerMessage) -> usize {
        self.fan_out(code, None, msg)
    }

    /// Like [`broadcast`](Self::broadcast) but skips `except`.
    pub fn broadcast_except(&self, code: &RoomCode, except: ConnectionId, msg: &ServerMessage) -> usize {
        self.fan_out(code, Some(except), msg)
    }

    /// Routes one message to a [`Recipient`].
    pub fn deliver(&self, recipient: &Recipient, msg: ServerMessage) -> usize {
        match recipient {
            Recipient::Room(code) => self.broadcast(code, &msg),
            Recipient::RoomExcept(code, except) => self.broadcast_except(code, *except, &msg),
            Recipient::Connection(connection) => usize::from(self.send_to(*connection, msg)),
        }
    }

    fn fan_out(&self, code: &RoomCode, except: Option<ConnectionId>, msg: &ServerMessage) -> usize {
        let Some(members) = self.channels.get(code) else {
            return 0;
        };
        members
            .iter()
            .filter(|c| Some(**c) != except)
            .filter_map(|c| self.sessions.get(c))
            .filter(|session| session.send(msg.clone()))
            .count()
    }

    // -- Queries ----------------------------------------------------------

    /// Connections subscribed to `code`, in id order.
    pub fn subscribers(&self, code: &RoomCode) -> Vec<ConnectionId> {
        let mut members: Vec<_> = self
            .channels
            .get(code)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Whether `connection` currently receives broadcasts for `code`.
    pub fn is_subscribed(&self, connection: ConnectionId, code: &RoomCode) -> bool {
        self.channels
            .get(code)
            .is_some_and(|m| m.contains(&connection))
    }

    pub fn get(&self, connection: ConnectionId) -> Option<&Session> {
        self.sessions.get(&connection)
    }

    pub fn is_open(&self, connection: ConnectionId) -> bool {
        self.sessions.contains_key(&connection)
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of channels with at least one subscriber.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn detach(&mut self, code: &RoomCode, connection: ConnectionId) {
        if let Some(members) = self.channels.get_mut(code) {
            members.remove(&connection);
            if members.is_empty() {
                self.channels.remove(code);
            }
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use partyline_protocol::{PlayerId, ServerEvent};
    use tokio::sync::mpsc;

    // -- Helpers ----------------------------------------------------------

    fn cid(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn room(code: &str) -> RoomCode {
        RoomCode::new(code)
    }

    fn ping_event() -> ServerMessage {
        ServerMessage::from(ServerEvent::HostChanged {
            new_host_id: PlayerId::new("p-1"),
        })
    }

    /// Opens a connection and returns the receiving end of its queue.
    fn open(mgr: &mut SessionManager, id: u64) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        mgr.open(cid(id), tx).expect("open should succeed");
        rx
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    // =====================================================================
    // open() / close()
    // =====================================================================

    #[test]
    fn test_open_registers_session() {
        let mut mgr = SessionManager::new();
        let _rx = open(&mut mgr, 1);

        assert!(mgr.is_open(cid(1)));
        assert_eq!(mgr.len(), 1);
        assert!(mgr.get(cid(1)).unwrap().channels.is_empty());
    }

    #[test]
    fn test_open_twice_returns_already_open() {
        let mut mgr = SessionManager::new();
        let _rx = open(&mut mgr, 1);
        let (tx, _rx2) = mpsc::unbounded_channel();

        let result = mgr.open(cid(1), tx);

        assert!(matches!(result, Err(SessionError::AlreadyOpen(c)) if c == cid(1)));
    }

    #[test]
    fn test_close_removes_from_all_channels() {
        let mut mgr = SessionManager::new();
        let _rx = open(&mut mgr, 1);
        mgr.subscribe(cid(1), &room("AAAAAA")).unwrap();
        mgr.subscribe(cid(1), &room("BBBBBB")).unwrap();

        let session = mgr.close(cid(1)).expect("session should exist");

        assert_eq!(session.channels.len(), 2);
        assert!(mgr.subscribers(&room("AAAAAA")).is_empty());
        assert!(mgr.subscribers(&room("BBBBBB")).is_empty());
        assert_eq!(mgr.channel_count(), 0);
        assert!(mgr.is_empty());
    }

    #[test]
    fn test_close_unknown_returns_none() {
        let mut mgr = SessionManager::new();
        assert!(mgr.close(cid(9)).is_none());
    }

    // =====================================================================
    // subscribe() / unsubscribe() / close_channel()
    // =====================================================================

    #[test]
    fn test_subscribe_unknown_connection_returns_not_found() {
        let mut mgr = SessionManager::new();
        let result = mgr.subscribe(cid(5), &room("AAAAAA"));
        assert!(matches!(result, Err(SessionError::NotFound(c)) if c == cid(5)));
    }

    #[test]
    fn test_subscribe_twice_is_idempotent() {
        let mut mgr = SessionManager::new();
        let _rx = open(&mut mgr, 1);

        assert!(mgr.subscribe(cid(1), &room("AAAAAA")).unwrap());
        assert!(!mgr.subscribe(cid(1), &room("AAAAAA")).unwrap());
        assert_eq!(mgr.subscribers(&room("AAAAAA")), vec![cid(1)]);
    }

    #[test]
    fn test_unsubscribe_stops_broadcasts() {
        let mut mgr = SessionManager::new();
        let mut rx = open(&mut mgr, 1);
        mgr.subscribe(cid(1), &room("AAAAAA")).unwrap();

        assert!(mgr.unsubscribe(cid(1), &room("AAAAAA")));
        assert!(!mgr.unsubscribe(cid(1), &room("AAAAAA")));

        assert_eq!(mgr.broadcast(&room("AAAAAA"), &ping_event()), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_close_channel_unsubscribes_everyone() {
        let mut mgr = SessionManager::new();
        let _rx1 = open(&mut mgr, 1);
        let _rx2 = open(&mut mgr, 2);
        mgr.subscribe(cid(1), &room("AAAAAA")).unwrap();
        mgr.subscribe(cid(2), &room("AAAAAA")).unwrap();

        assert_eq!(mgr.close_channel(&room("AAAAAA")), 2);

        assert!(!mgr.is_subscribed(cid(1), &room("AAAAAA")));
        assert!(mgr.get(cid(2)).unwrap().channels.is_empty());
        assert_eq!(mgr.close_channel(&room("AAAAAA")), 0);
    }

    // =====================================================================
    // Delivery
    // =====================================================================

    #[test]
    fn test_broadcast_reaches_only_subscribers() {
        let mut mgr = SessionManager::new();
        let mut rx1 = open(&mut mgr, 1);
        let mut rx2 = open(&mut mgr, 2);
        let mut rx3 = open(&mut mgr, 3);
        mgr.subscribe(cid(1), &room("AAAAAA")).unwrap();
        mgr.subscribe(cid(2), &room("AAAAAA")).unwrap();
        mgr.subscribe(cid(3), &room("BBBBBB")).unwrap();

        let sent = mgr.broadcast(&room("AAAAAA"), &ping_event());

        assert_eq!(sent, 2);
        assert_eq!(drain(&mut rx1), vec![ping_event()]);
        assert_eq!(drain(&mut rx2), vec![ping_event()]);
        assert!(drain(&mut rx3).is_empty());
    }

    #[test]
    fn test_broadcast_except_skips_sender() {
        let mut mgr = SessionManager::new();
        let mut rx1 = open(&mut mgr, 1);
        let mut rx2 = open(&mut mgr, 2);
        mgr.subscribe(cid(1), &room("AAAAAA")).unwrap();
        mgr.subscribe(cid(2), &room("AAAAAA")).unwrap();

        let sent = mgr.broadcast_except(&room("AAAAAA"), cid(1), &ping_event());

        assert_eq!(sent, 1);
        assert!(drain(&mut rx1).is_empty());
        assert_eq!(drain(&mut rx2).len(), 1);
    }

    #[test]
    fn test_send_to_dropped_receiver_returns_false() {
        let mut mgr = SessionManager::new();
        let rx = open(&mut mgr, 1);
        drop(rx);

        assert!(!mgr.send_to(cid(1), ping_event()));
        assert!(!mgr.send_to(cid(2), ping_event()), "unknown connection");
    }

    #[test]
    fn test_deliver_routes_each_recipient() {
        let mut mgr = SessionManager::new();
        let mut rx1 = open(&mut mgr, 1);
        let mut rx2 = open(&mut mgr, 2);
        mgr.subscribe(cid(1), &room("AAAAAA")).unwrap();
        mgr.subscribe(cid(2), &room("AAAAAA")).unwrap();

        let left = ServerMessage::from(ServerEvent::PlayerLeft {
            player_id: PlayerId::new("p-2"),
            player_name: "Bo".into(),
        });
        assert_eq!(mgr.deliver(&Recipient::Connection(cid(2)), ping_event()), 1);
        assert_eq!(
            mgr.deliver(&Recipient::RoomExcept(room("AAAAAA"), cid(2)), left.clone()),
            1
        );
        assert_eq!(mgr.deliver(&Recipient::Room(room("AAAAAA")), ping_event()), 2);

        assert_eq!(drain(&mut rx1), vec![left, ping_event()]);
        assert_eq!(drain(&mut rx2), vec![ping_event(), ping_event()]);
    }

    #[test]
    fn test_subscribers_are_sorted() {
        let mut mgr = SessionManager::new();
        let _rx = [open(&mut mgr, 3), open(&mut mgr, 1), open(&mut mgr, 2)];
        for id in [3, 1, 2] {
            mgr.subscribe(cid(id), &room("AAAAAA")).unwrap();
        }
        assert_eq!(mgr.subscribers(&room("AAAAAA")), vec![cid(1), cid(2), cid(3)]);
    }
}
