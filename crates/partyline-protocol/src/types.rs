//! Core protocol types for Partyline's wire format.
//!
//! Everything in this module travels over the socket as JSON. Clients
//! send a [`Request`] wrapping one [`ClientEvent`]; the server answers
//! with [`ServerMessage`]s, which are either a [`Reply`] to an
//! acknowledged request, a room [`ServerEvent`], or a protocol error.

use std::fmt;

use partyline_transport::ConnectionId;
use serde::{Deserialize, Serialize};

/// Opaque game payload. The server stores and relays it, never reads it.
pub type Blob = serde_json::Value;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Durable, client-chosen player identity.
///
/// Unlike a [`ConnectionId`], this survives reconnects: a client that
/// drops and comes back presents the same `PlayerId` and gets its seat
/// back. Serialized as a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short human-typable room code, e.g. `"K7MPQ2"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(pub String);

impl RoomCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the upper-cased form players can type in any case.
    pub fn normalized(&self) -> Self {
        Self(self.0.to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Player — one roster entry
// ---------------------------------------------------------------------------

/// One seat in a room's roster, exactly as clients see it.
///
/// Field names follow the JavaScript client convention (`isReady`,
/// `isHost`, `isAI`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    /// The live connection bound to this seat, `None` while disconnected.
    /// Always `None` for AI players.
    #[serde(rename = "connectionId")]
    pub connection: Option<ConnectionId>,
    pub name: String,
    pub role: Option<String>,
    pub is_ready: bool,
    pub is_host: bool,
    #[serde(rename = "isAI")]
    pub is_ai: bool,
    pub score: i64,
}

impl Player {
    /// A human player bound to `connection`, with no role and not ready.
    pub fn human(id: PlayerId, name: impl Into<String>, connection: ConnectionId) -> Self {
        Self {
            id,
            connection: Some(connection),
            name: name.into(),
            role: None,
            is_ready: false,
            is_host: false,
            is_ai: false,
            score: 0,
        }
    }

    /// An AI seat: always ready, never connected, never host.
    pub fn ai(id: PlayerId, name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id,
            connection: None,
            name: name.into(),
            role: Some(role.into()),
            is_ready: true,
            is_host: false,
            is_ai: true,
            score: 0,
        }
    }

    /// `true` if this is a human seat whose connection has dropped.
    pub fn is_disconnected(&self) -> bool {
        !self.is_ai && self.connection.is_none()
    }
}

// ---------------------------------------------------------------------------
// Recipient — where a server message goes
// ---------------------------------------------------------------------------

/// Delivery target for an outbound [`ServerMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// Every connection subscribed to the room's channel.
    Room(RoomCode),
    /// Every subscriber of the room's channel except one connection.
    RoomExcept(RoomCode, ConnectionId),
    /// A single connection.
    Connection(ConnectionId),
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// One inbound message.
///
/// `ack` is the client's correlation id. Events that produce a reply
/// (`create_room`, `join_room`, `ping`) only send it when `ack` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
    pub event: ClientEvent,
}

/// Everything a client can ask the server to do.
///
/// Serialized as `{ "type": "join_room", "roomCode": ..., ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    CreateRoom {
        player_id: PlayerId,
        player_name: String,
        #[serde(default)]
        business_type: String,
    },
    JoinRoom {
        room_code: RoomCode,
        player_id: PlayerId,
        player_name: String,
    },
    SelectRole {
        room_code: RoomCode,
        player_id: PlayerId,
        role: String,
    },
    SetReady {
        room_code: RoomCode,
        player_id: PlayerId,
        ready: bool,
    },
    AddAiPlayer {
        room_code: RoomCode,
        role: String,
        ai_name: String,
    },
    RemovePlayer {
        room_code: RoomCode,
        player_id: PlayerId,
    },
    StartGame {
        room_code: RoomCode,
        #[serde(default)]
        initial_state: Blob,
    },
    SyncGameState {
        room_code: RoomCode,
        #[serde(default)]
        game_state: Blob,
    },
    PlayerAction {
        room_code: RoomCode,
        #[serde(default)]
        action: Blob,
    },
    EndGame {
        room_code: RoomCode,
        #[serde(default)]
        results: Blob,
    },
    LeaveRoom {
        room_code: RoomCode,
    },
    Ping,
}

impl ClientEvent {
    /// The wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateRoom { .. } => "create_room",
            Self::JoinRoom { .. } => "join_room",
            Self::SelectRole { .. } => "select_role",
            Self::SetReady { .. } => "set_ready",
            Self::AddAiPlayer { .. } => "add_ai_player",
            Self::RemovePlayer { .. } => "remove_player",
            Self::StartGame { .. } => "start_game",
            Self::SyncGameState { .. } => "sync_game_state",
            Self::PlayerAction { .. } => "player_action",
            Self::EndGame { .. } => "end_game",
            Self::LeaveRoom { .. } => "leave_room",
            Self::Ping => "ping",
        }
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Why a join was refused. These are the only rejections a player sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    RoomNotFound,
    GameInProgress,
    RoomFull,
    /// The requested player id belongs to an AI seat.
    PlayerIdTaken,
}

impl RejectReason {
    /// Message suitable for showing to the player as-is.
    pub fn message(self) -> &'static str {
        match self {
            Self::RoomNotFound => "Room not found",
            Self::GameInProgress => "Game already in progress",
            Self::RoomFull => "Room is full",
            Self::PlayerIdTaken => "Player id already in use",
        }
    }
}

/// Direct answer to an acknowledged [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Reply {
    RoomCreated {
        room_code: RoomCode,
        players: Vec<Player>,
    },
    RoomJoined {
        room_code: RoomCode,
        players: Vec<Player>,
        business_type: String,
    },
    Rejected {
        reason: RejectReason,
        message: String,
    },
    Pong {
        /// Milliseconds since the Unix epoch.
        timestamp: u64,
    },
}

impl Reply {
    pub fn rejected(reason: RejectReason) -> Self {
        Self::Rejected {
            reason,
            message: reason.message().to_string(),
        }
    }
}

/// Room notifications pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    PlayersUpdated {
        players: Vec<Player>,
    },
    PlayerJoined {
        player: Player,
    },
    PlayerLeft {
        player_id: PlayerId,
        player_name: String,
    },
    PlayerDisconnected {
        player_id: PlayerId,
        player_name: String,
    },
    HostChanged {
        new_host_id: PlayerId,
    },
    GameStarted {
        game_state: Blob,
    },
    GameStateUpdated {
        game_state: Blob,
    },
    PlayerActionReceived {
        /// The player bound to the sending connection, if any.
        player_id: Option<PlayerId>,
        action: Blob,
    },
    GameEnded {
        results: Blob,
    },
}

/// Every message the server writes to a socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Answer to the request carrying the same `ack`.
    Reply { ack: u64, reply: Reply },
    /// A room event.
    Event(ServerEvent),
    /// The last frame could not be understood. The socket stays open.
    /// `code` follows HTTP conventions (400 = bad request).
    Error { code: u16, message: String },
}

impl From<ServerEvent> for ServerMessage {
    fn from(event: ServerEvent) -> Self {
        Self::Event(event)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The JavaScript client parses these shapes directly, so the tests
    //! pin the JSON layout rather than just round-tripping.

    use super::*;
    use serde_json::json;

    fn host() -> Player {
        let mut p = Player::human(PlayerId::new("p-1"), "Ann", ConnectionId::new(4));
        p.is_host = true;
        p
    }

    #[test]
    fn test_player_id_and_room_code_are_plain_strings() {
        assert_eq!(serde_json::to_string(&PlayerId::new("p-1")).unwrap(), "\"p-1\"");
        assert_eq!(serde_json::to_string(&RoomCode::new("ABC234")).unwrap(), "\"ABC234\"");
    }

    #[test]
    fn test_room_code_normalized_uppercases() {
        assert_eq!(RoomCode::new("abc2x4").normalized(), RoomCode::new("ABC2X4"));
    }

    #[test]
    fn test_player_json_uses_client_field_names() {
        let json = serde_json::to_value(host()).unwrap();
        assert_eq!(
            json,
            json!({
                "id": "p-1",
                "connectionId": 4,
                "name": "Ann",
                "role": null,
                "isReady": false,
                "isHost": true,
                "isAI": false,
                "score": 0,
            })
        );
    }

    #[test]
    fn test_ai_player_is_ready_and_unbound() {
        let ai = Player::ai(PlayerId::new("ai-1"), "Bot", "pitmaster");
        assert!(ai.is_ready);
        assert!(ai.is_ai);
        assert!(!ai.is_host);
        assert!(ai.connection.is_none());
        assert!(!ai.is_disconnected(), "AI seats never count as disconnected");
    }

    #[test]
    fn test_request_join_room_parses_from_client_json() {
        let raw = r#"{
            "ack": 3,
            "event": {
                "type": "join_room",
                "roomCode": "abc234",
                "playerId": "p-2",
                "playerName": "Bo"
            }
        }"#;
        let req: Request = serde_json::from_str(raw).unwrap();
        assert_eq!(req.ack, Some(3));
        assert_eq!(
            req.event,
            ClientEvent::JoinRoom {
                room_code: RoomCode::new("abc234"),
                player_id: PlayerId::new("p-2"),
                player_name: "Bo".into(),
            }
        );
    }

    #[test]
    fn test_request_without_ack_and_unit_event() {
        let req: Request = serde_json::from_str(r#"{"event":{"type":"ping"}}"#).unwrap();
        assert_eq!(req.ack, None);
        assert_eq!(req.event, ClientEvent::Ping);
    }

    #[test]
    fn test_add_ai_player_event_name() {
        let raw = r#"{"event":{"type":"add_ai_player","roomCode":"R","role":"cook","aiName":"Bot"}}"#;
        let req: Request = serde_json::from_str(raw).unwrap();
        assert_eq!(req.event.name(), "add_ai_player");
    }

    #[test]
    fn test_missing_blob_defaults_to_null() {
        let raw = r#"{"event":{"type":"start_game","roomCode":"R"}}"#;
        let req: Request = serde_json::from_str(raw).unwrap();
        match req.event {
            ClientEvent::StartGame { initial_state, .. } => assert!(initial_state.is_null()),
            other => panic!("expected StartGame, got {other:?}"),
        }
    }

    #[test]
    fn test_blob_passes_through_untouched() {
        let raw = r#"{"event":{"type":"sync_game_state","roomCode":"R","gameState":{"turn":3,"board":[1,2]}}}"#;
        let req: Request = serde_json::from_str(raw).unwrap();
        match req.event {
            ClientEvent::SyncGameState { game_state, .. } => {
                assert_eq!(game_state, json!({"turn": 3, "board": [1, 2]}));
            }
            other => panic!("expected SyncGameState, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        let raw = r#"{"event":{"type":"fly_to_moon"}}"#;
        assert!(serde_json::from_str::<Request>(raw).is_err());
    }

    #[test]
    fn test_server_event_json_format() {
        let msg = ServerMessage::from(ServerEvent::PlayerLeft {
            player_id: PlayerId::new("p-2"),
            player_name: "Bo".into(),
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            json!({"type": "event", "event": "player_left", "playerId": "p-2", "playerName": "Bo"})
        );
    }

    #[test]
    fn test_server_event_decodes_back() {
        let msg = ServerMessage::from(ServerEvent::HostChanged {
            new_host_id: PlayerId::new("p-3"),
        });
        let bytes = serde_json::to_vec(&msg).unwrap();
        let decoded: ServerMessage = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_reply_room_joined_json_format() {
        let msg = ServerMessage::Reply {
            ack: 9,
            reply: Reply::RoomJoined {
                room_code: RoomCode::new("ABC234"),
                players: vec![host()],
                business_type: "bbq".into(),
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "reply");
        assert_eq!(json["ack"], 9);
        assert_eq!(json["reply"]["kind"], "room_joined");
        assert_eq!(json["reply"]["roomCode"], "ABC234");
        assert_eq!(json["reply"]["businessType"], "bbq");
        assert_eq!(json["reply"]["players"][0]["isHost"], true);
    }

    #[test]
    fn test_rejected_reply_carries_reason_and_message() {
        let json = serde_json::to_value(Reply::rejected(RejectReason::RoomFull)).unwrap();
        assert_eq!(
            json,
            json!({"kind": "rejected", "reason": "room_full", "message": "Room is full"})
        );

        let json = serde_json::to_value(Reply::rejected(RejectReason::PlayerIdTaken)).unwrap();
        assert_eq!(json["reason"], "player_id_taken");
        assert_eq!(json["message"], "Player id already in use");
    }

    #[test]
    fn test_error_message_json_format() {
        let msg = ServerMessage::Error {
            code: 400,
            message: "bad frame".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, json!({"type": "error", "code": 400, "message": "bad frame"}));
    }
}
