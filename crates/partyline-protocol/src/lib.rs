//! Wire protocol for Partyline.
//!
//! This crate defines what clients and the server say to each other:
//!
//! - **Types** ([`Request`], [`ClientEvent`], [`ServerMessage`],
//!   [`ServerEvent`], [`Reply`], [`Player`]) that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) that turns them into
//!   frame payloads.
//! - **Errors** ([`ProtocolError`]).
//!
//! The protocol layer sits between transport (raw frames) and the room
//! coordinator. It knows nothing about sockets or rooms.
//!
//! ```text
//! Transport (bytes) → Protocol (Request / ServerMessage) → Rooms
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    Blob, ClientEvent, Player, PlayerId, Recipient, RejectReason, Reply, Request, RoomCode,
    ServerEvent, ServerMessage,
};
