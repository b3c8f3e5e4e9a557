//! Room configuration and the game phase state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Rules and timings shared by every room on a server.
///
/// Override individual fields with struct-update syntax:
///
/// ```rust
/// use std::time::Duration;
/// use partyline_room::RoomConfig;
///
/// let config = RoomConfig {
///     reconnect_grace: Duration::from_secs(10),
///     ..RoomConfig::default()
/// };
/// assert_eq!(config.max_players, 5);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Maximum players (humans and AI) while the room is in the lobby.
    pub max_players: usize,

    /// How long a player who dropped in the lobby keeps their seat.
    pub reconnect_grace: Duration,

    /// Rooms older than this are removed by the sweep, active or not.
    pub room_ttl: Duration,

    /// Time between sweeps. `Duration::ZERO` disables the sweep.
    pub sweep_interval: Duration,

    /// Number of characters in a room code.
    pub code_length: usize,

    /// How many random codes to try before giving up on creation.
    pub max_code_attempts: u32,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_players: 5,
            reconnect_grace: Duration::from_secs(30),
            room_ttl: Duration::from_secs(2 * 60 * 60),
            sweep_interval: Duration::from_secs(30 * 60),
            code_length: 6,
            max_code_attempts: 1000,
        }
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Where a room is in its game.
///
/// Transitions are strictly forward, driven by the host:
///
/// ```text
/// Lobby ──(start_game)──→ Playing ──(end_game)──→ Results
/// ```
///
/// - **Lobby**: players join, pick roles and ready up. Disconnects get a
///   grace period.
/// - **Playing**: the host relays game state. Nobody new can join, and a
///   dropped player's seat is held until they rejoin by code.
/// - **Results**: terminal. The room only waits for players to leave or
///   for the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Lobby,
    Playing,
    Results,
}

impl Phase {
    /// Returns `true` if new players may join.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Lobby)
    }

    /// The phase after this one, or `None` from the terminal phase.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Lobby => Some(Self::Playing),
            Self::Playing => Some(Self::Results),
            Self::Results => None,
        }
    }

    /// Returns `true` if moving to `target` is a valid transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lobby => write!(f, "lobby"),
            Self::Playing => write!(f, "playing"),
            Self::Results => write!(f, "results"),
        }
    }
}
