//! # Partyline
//!
//! Room and session coordinator for short-lived multiplayer web games.
//!
//! Players share a six-character code to join a room, pick roles, ready
//! up, and the host's client drives the game, pushing opaque state blobs
//! that Partyline relays to everyone else. The server owns the roster,
//! host authority and migration, reconnection within a grace period, and
//! cleanup of abandoned rooms.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use partyline::prelude::*;
//!
//! # async fn run() -> Result<(), PartylineError> {
//! let server = PartylineServerBuilder::new()
//!     .bind("0.0.0.0:3001")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::PartylineError;
pub use server::{PartylineServer, PartylineServerBuilder};

pub mod prelude {
    pub use crate::{PartylineError, PartylineServer, PartylineServerBuilder};

    pub use partyline_protocol::{
        Blob, ClientEvent, Codec, JsonCodec, Player, PlayerId, ProtocolError, RejectReason, Reply,
        Request, RoomCode, ServerEvent, ServerMessage,
    };
    pub use partyline_room::{LobbyHandle, Phase, Room, RoomConfig, RoomError};
    pub use partyline_session::SessionError;
    pub use partyline_transport::{ConnectionId, TransportError};
}
