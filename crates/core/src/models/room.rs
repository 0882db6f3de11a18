//! Room model

use serde::{Deserialize, Serialize};

use super::RoomId;

/// A bookable physical room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    /// Maximum number of people, owner included
    pub capacity: u32,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Room {
    pub fn new(id: impl Into<String>, name: impl Into<String>, capacity: u32) -> Self {
        Self {
            id: RoomId::new(id),
            name: name.into(),
            capacity,
            location: String::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }
}
