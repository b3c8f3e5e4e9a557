//! Connection sessions and room channels for Partyline.
//!
//! This crate is the "who is listening" layer:
//!
//! 1. **Sessions** track every live connection and its outbound queue
//!    ([`Session`], [`PeerSender`]).
//! 2. **Channels** group connections under a [`RoomCode`] so a room can
//!    broadcast without knowing who is subscribed ([`SessionManager`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)     ← decides what to say and to whom (Recipient)
//!     ↕
//! Session Layer (this)   ← turns a Recipient into per-connection sends
//!     ↕
//! Protocol Layer (below) ← ServerMessage, RoomCode
//! ```
//!
//! [`RoomCode`]: partyline_protocol::RoomCode

mod error;
mod manager;
mod session;

pub use error::SessionError;
pub use manager::SessionManager;
pub use session::{PeerSender, Session};
