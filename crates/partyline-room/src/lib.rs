//! Room coordination for Partyline.
//!
//! Rooms are short-lived game sessions players find by a six-letter
//! code. This crate owns the rules: who may join, roles and readiness,
//! host authority and hand-over, disconnect grace periods, and the
//! sweep that clears out stale rooms.
//!
//! All room state lives in one task, the lobby actor, which processes
//! events one at a time.
//!
//! # Key types
//!
//! - [`spawn_lobby`] / [`LobbyHandle`] — start the actor, talk to it
//! - [`RoomManager`] — the rules, usable synchronously (and in tests)
//! - [`Room`] / [`Phase`] — one session and its lifecycle
//! - [`RoomStore`] / [`MemoryStore`] — where rooms are kept
//! - [`CodeGenerator`] — collision-free room codes
//! - [`RoomConfig`] — caps and timings

mod actor;
mod code;
mod config;
mod error;
mod manager;
mod room;
mod store;

pub use actor::{LobbyHandle, spawn_lobby, spawn_lobby_with_store};
pub use code::{CodeGenerator, ROOM_CODE_ALPHABET, ai_player_id, is_valid_room_code};
pub use config::{Phase, RoomConfig};
pub use error::RoomError;
pub use manager::{GraceTimer, RoomManager};
pub use room::{Departure, DepartureOutcome, Room};
pub use store::{MemoryStore, RoomStore};
