//! The room registry.
//!
//! [`RoomManager`](crate::RoomManager) is generic over [`RoomStore`] so
//! the registry can be swapped (or inspected in tests) without touching
//! the roster rules. The store itself enforces nothing: code uniqueness
//! and the "no empty rooms" rule live in the manager.

use std::collections::HashMap;

use partyline_protocol::RoomCode;

use crate::Room;

/// Keyed storage for live rooms.
///
/// Implementations only need to be usable from one task; the lobby
/// actor is the sole owner.
pub trait RoomStore: Send + 'static {
    fn get(&self, code: &RoomCode) -> Option<&Room>;

    fn get_mut(&mut self, code: &RoomCode) -> Option<&mut Room>;

    /// Inserts a room under its own code, replacing any previous entry.
    fn insert(&mut self, room: Room) -> Option<Room>;

    fn remove(&mut self, code: &RoomCode) -> Option<Room>;

    /// Every stored code, in no particular order.
    fn codes(&self) -> Vec<RoomCode>;

    fn len(&self) -> usize;

    fn contains(&self, code: &RoomCode) -> bool {
        self.get(code).is_some()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory [`RoomStore`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rooms: HashMap<RoomCode, Room>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoomStore for MemoryStore {
    fn get(&self, code: &RoomCode) -> Option<&Room> {
        self.rooms.get(code)
    }

    fn get_mut(&mut self, code: &RoomCode) -> Option<&mut Room> {
        self.rooms.get_mut(code)
    }

    fn insert(&mut self, room: Room) -> Option<Room> {
        self.rooms.insert(room.code.clone(), room)
    }

    fn remove(&mut self, code: &RoomCode) -> Option<Room> {
        self.rooms.remove(code)
    }

    fn codes(&self) -> Vec<RoomCode> {
        self.rooms.keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.rooms.len()
    }
}
