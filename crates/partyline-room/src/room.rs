//! The room entity and the roster rules that only need the room itself.

use std::time::{Duration, Instant};

use partyline_protocol::{Blob, Player, PlayerId, RoomCode};
use partyline_transport::ConnectionId;

use crate::Phase;

/// One game session.
///
/// Connections and players are referenced by plain ids and resolved on
/// every use, so nothing here can dangle after a socket closes.
#[derive(Debug, Clone)]
pub struct Room {
    pub code: RoomCode,
    /// The host's live connection. `None` while the host is disconnected.
    pub host_connection: Option<ConnectionId>,
    pub business_type: String,
    /// Roster in join order. Order decides host succession.
    pub players: Vec<Player>,
    pub phase: Phase,
    /// Last state pushed by the host. Never inspected.
    pub game_state: Option<Blob>,
    pub created_at: Instant,
}

/// What happened to the room when a player was taken off the roster.
#[derive(Debug, Clone, PartialEq)]
pub enum DepartureOutcome {
    /// A non-host left; nothing else changed.
    Stayed,
    /// The host left and this player took over.
    HostChanged(PlayerId),
    /// No human is left. The caller must delete the room.
    Abandoned,
}

/// A player removed from a room, and the consequence.
#[derive(Debug, Clone)]
pub struct Departure {
    pub player: Player,
    pub outcome: DepartureOutcome,
}

impl Room {
    /// A fresh lobby whose only player, `host`, is made host.
    pub fn new(code: RoomCode, business_type: impl Into<String>, mut host: Player) -> Self {
        host.is_host = true;
        Self {
            code,
            host_connection: host.connection,
            business_type: business_type.into(),
            players: vec![host],
            phase: Phase::Lobby,
            game_state: None,
            created_at: tokio::time::Instant::now().into_std(),
        }
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }

    pub fn player_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| &p.id == id)
    }

    /// The player currently bound to `connection`, if any.
    pub fn player_on(&self, connection: ConnectionId) -> Option<&Player> {
        self.players
            .iter()
            .find(|p| p.connection == Some(connection))
    }

    pub fn host(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.is_host)
    }

    /// Whether `connection` is the host's live connection.
    pub fn is_host_connection(&self, connection: ConnectionId) -> bool {
        self.host_connection == Some(connection)
    }

    /// Whether someone other than `except` already holds `role`.
    pub fn role_taken(&self, role: &str, except: Option<&PlayerId>) -> bool {
        self.players
            .iter()
            .any(|p| p.role.as_deref() == Some(role) && Some(&p.id) != except)
    }

    pub fn has_humans(&self) -> bool {
        self.players.iter().any(|p| !p.is_ai)
    }

    pub fn all_ready(&self) -> bool {
        self.players.iter().all(|p| p.is_ready)
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Points an existing player at a new connection. Keeps
    /// `host_connection` in step when that player is host.
    ///
    /// Returns `false` if no such player exists. AI seats never take a
    /// connection, so they return `false` as well.
    pub fn rebind(&mut self, id: &PlayerId, connection: ConnectionId) -> bool {
        let Some(player) = self.player_mut(id).filter(|p| !p.is_ai) else {
            return false;
        };
        player.connection = Some(connection);
        let is_host = player.is_host;
        if is_host {
            self.host_connection = Some(connection);
        }
        true
    }

    /// Marks a player as disconnected, keeping their seat.
    pub fn unbind(&mut self, id: &PlayerId) {
        let Some(player) = self.player_mut(id) else {
            return;
        };
        player.connection = None;
        let is_host = player.is_host;
        if is_host {
            self.host_connection = None;
        }
    }

    /// Takes a player off the roster and, if they were host, hands the
    /// role to the first remaining human in join order.
    ///
    /// Returns `None` if the player is not in the room.
    pub fn remove_player(&mut self, id: &PlayerId) -> Option<Departure> {
        let index = self.players.iter().position(|p| &p.id == id)?;
        let player = self.players.remove(index);

        if !self.has_humans() {
            self.host_connection = None;
            return Some(Departure {
                player,
                outcome: DepartureOutcome::Abandoned,
            });
        }

        if !player.is_host {
            return Some(Departure {
                player,
                outcome: DepartureOutcome::Stayed,
            });
        }

        // has_humans() above guarantees a candidate exists.
        let outcome = match self.players.iter_mut().find(|p| !p.is_ai) {
            Some(next) => {
                next.is_host = true;
                self.host_connection = next.connection;
                DepartureOutcome::HostChanged(next.id.clone())
            }
            None => DepartureOutcome::Abandoned,
        };
        Some(Departure { player, outcome })
    }
}
