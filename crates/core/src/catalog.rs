//! Room catalog - the read-only set of bookable rooms
//!
//! The catalog is reference data: it is built once at startup (from
//! configuration or the built-in defaults) and shared without locking.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::models::{Room, RoomId};

/// Lookup table of rooms by id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomCatalog {
    rooms: BTreeMap<RoomId, Room>,
}

impl RoomCatalog {
    /// Build a catalog, rejecting duplicate ids and rooms that cannot hold
    /// even their owner
    pub fn new(rooms: Vec<Room>) -> Result<Self> {
        let mut map = BTreeMap::new();

        for room in rooms {
            if room.id.as_str().trim().is_empty() {
                return Err(Error::Config("room with empty id".into()));
            }
            if room.capacity == 0 {
                return Err(Error::Config(format!(
                    "room '{}' has zero capacity",
                    room.id
                )));
            }
            if map.contains_key(&room.id) {
                return Err(Error::Config(format!("duplicate room id '{}'", room.id)));
            }
            map.insert(room.id.clone(), room);
        }

        Ok(Self { rooms: map })
    }

    /// Get a room by id
    pub fn get(&self, room_id: &RoomId) -> Result<&Room> {
        self.rooms
            .get(room_id)
            .ok_or_else(|| Error::NotFound(format!("room {}", room_id)))
    }

    /// Check if a room exists
    pub fn contains(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Capacity of a room, owner included
    pub fn capacity(&self, room_id: &RoomId) -> Result<u32> {
        self.get(room_id).map(|r| r.capacity)
    }

    /// All rooms, ordered by id
    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl Default for RoomCatalog {
    fn default() -> Self {
        Self {
            rooms: default_rooms()
                .into_iter()
                .map(|r| (r.id.clone(), r))
                .collect(),
        }
    }
}

/// Rooms used when configuration lists none
pub fn default_rooms() -> Vec<Room> {
    vec![
        Room::new("r1", "Room A", 6)
            .with_location("1F")
            .with_tags(&["projector"]),
        Room::new("r2", "Room B", 10)
            .with_location("2F")
            .with_tags(&["whiteboard"]),
        Room::new("r3", "Room C", 8)
            .with_location("3F")
            .with_tags(&["conference"]),
    ]
}
