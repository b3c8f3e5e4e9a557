//! Error types for the room layer.

use partyline_protocol::{PlayerId, RejectReason, RoomCode};

/// Errors that can occur during room operations.
///
/// Only the first four ever reach a player, as a join rejection. Every
/// other bad request (unknown room, unknown player, non-host acting as
/// host) is dropped without an error at all.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No room with this code exists.
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// The room has left the lobby and takes no new players.
    #[error("room {0} already has a game in progress")]
    GameInProgress(RoomCode),

    /// The room is at its player cap.
    #[error("room {0} is full")]
    RoomFull(RoomCode),

    /// The player id is held by an AI seat, which no connection may claim.
    #[error("player {player_id} in room {room_code} is not claimable")]
    PlayerIdTaken {
        room_code: RoomCode,
        player_id: PlayerId,
    },

    /// No free room code was found. The store is saturated or the code
    /// length is misconfigured; the lobby cannot keep creating rooms.
    #[error("no free room code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },

    /// The lobby actor has stopped.
    #[error("lobby is unavailable")]
    Unavailable,
}

impl RoomError {
    /// The player-facing reason, for errors that are shown to players.
    pub fn rejection(&self) -> Option<RejectReason> {
        match self {
            Self::NotFound(_) => Some(RejectReason::RoomNotFound),
            Self::GameInProgress(_) => Some(RejectReason::GameInProgress),
            Self::RoomFull(_) => Some(RejectReason::RoomFull),
            Self::PlayerIdTaken { .. } => Some(RejectReason::PlayerIdTaken),
            Self::CodeSpaceExhausted { .. } | Self::Unavailable => None,
        }
    }

    /// Whether the lobby must stop after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CodeSpaceExhausted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_maps_user_facing_errors() {
        let code = RoomCode::new("ABC234");
        assert_eq!(
            RoomError::NotFound(code.clone()).rejection(),
            Some(RejectReason::RoomNotFound)
        );
        assert_eq!(
            RoomError::GameInProgress(code.clone()).rejection(),
            Some(RejectReason::GameInProgress)
        );
        assert_eq!(
            RoomError::RoomFull(code.clone()).rejection(),
            Some(RejectReason::RoomFull)
        );
        assert_eq!(
            RoomError::PlayerIdTaken {
                room_code: code,
                player_id: PlayerId::new("ai-1"),
            }
            .rejection(),
            Some(RejectReason::PlayerIdTaken)
        );
        assert_eq!(RoomError::Unavailable.rejection(), None);
    }

    #[test]
    fn test_only_code_space_exhaustion_is_fatal() {
        assert!(RoomError::CodeSpaceExhausted { attempts: 3 }.is_fatal());
        assert!(!RoomError::RoomFull(RoomCode::new("X")).is_fatal());
        assert!(!RoomError::Unavailable.is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = RoomError::CodeSpaceExhausted { attempts: 1000 };
        assert_eq!(err.to_string(), "no free room code after 1000 attempts");
    }
}
