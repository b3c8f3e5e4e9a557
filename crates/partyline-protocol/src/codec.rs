//! Codec trait and the JSON implementation used on the wire.
//!
//! The server never touches `serde_json` directly: the connection
//! handler encodes [`ServerMessage`](crate::ServerMessage)s and decodes
//! [`Request`](crate::Request)s through a [`Codec`], so the framing can
//! be swapped without touching room logic.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Converts protocol values to and from frame payloads.
///
/// `Send + Sync + 'static` because a single codec value is shared by
/// every connection task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if the value cannot be
    /// represented in this format.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] for an empty frame and
    /// [`ProtocolError::Decode`] if the bytes don't match the type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that speaks JSON, the format browser clients send.
///
/// ```rust
/// use partyline_protocol::{ClientEvent, Codec, JsonCodec, Request};
///
/// let codec = JsonCodec;
/// let req: Request = codec.decode(br#"{"ack":1,"event":{"type":"ping"}}"#).unwrap();
/// assert_eq!(req.event, ClientEvent::Ping);
///
/// let bytes = codec.encode(&req).unwrap();
/// let again: Request = codec.decode(&bytes).unwrap();
/// assert_eq!(again, req);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Err(ProtocolError::InvalidMessage("empty frame".into()));
        }
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClientEvent, RoomCode, ServerEvent, ServerMessage};

    #[test]
    fn test_json_codec_encodes_server_event_as_text_json() {
        let msg = ServerMessage::from(ServerEvent::GameEnded {
            results: serde_json::json!({"winner": "p-1"}),
        });
        let bytes = JsonCodec.encode(&msg).unwrap();
        let text = std::str::from_utf8(&bytes).expect("JSON is UTF-8");
        assert!(text.contains(r#""event":"game_ended""#));
        assert!(text.contains(r#""winner":"p-1""#));
    }

    #[test]
    fn test_json_codec_decodes_request() {
        let req: crate::Request = JsonCodec
            .decode(br#"{"event":{"type":"leave_room","roomCode":"ABC234"}}"#)
            .unwrap();
        assert_eq!(
            req.event,
            ClientEvent::LeaveRoom {
                room_code: RoomCode::new("ABC234")
            }
        );
    }

    #[test]
    fn test_json_codec_rejects_empty_frame() {
        let err = JsonCodec.decode::<crate::Request>(b"  \n").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessage(_)));
    }

    #[test]
    fn test_json_codec_reports_malformed_json() {
        let err = JsonCodec.decode::<crate::Request>(b"{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
        assert!(err.to_string().starts_with("decode failed"));
    }

    #[test]
    fn test_json_codec_reports_missing_fields() {
        // join_room without a player id
        let err = JsonCodec
            .decode::<crate::Request>(br#"{"event":{"type":"join_room","roomCode":"X"}}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }
}
