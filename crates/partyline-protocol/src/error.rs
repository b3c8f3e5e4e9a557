//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding frames.
///
/// None of these are fatal for a connection: the handler reports a
/// decode failure back to the client and keeps reading.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, an unknown event type,
    /// or missing fields.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame parsed but is not a usable message, e.g. it was empty.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
