//! Network protocol message types
//!
//! All messages are JSON-serialized and length-prefixed on the wire. Every
//! request carries a client-chosen `id` that the matching response echoes.

use serde::{Deserialize, Serialize};

use roombook_core::{
    Booking, BookingId, Error as CoreError, MembershipState, Room, RoomId, UserId, UserProfile,
};
use roombook_core::models::{format_clock, format_date};

/// Client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    /// Session token from `Register` or `Login`
    #[serde(default)]
    pub token: Option<String>,
    pub body: RequestBody,
}

/// Which bookings `ListBookings` returns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListFilter {
    /// Owned or joined by the caller
    Mine,
    /// Everything in one room
    Room(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RequestBody {
    /// Liveness check; no session needed
    Ping,

    Register {
        username: String,
        password: String,
    },

    Login {
        username: String,
        password: String,
    },

    Logout,

    /// Profile of the session's user
    Me,

    ListRooms,

    /// Times are local wall-clock, "YYYY-MM-DD" and "HH:MM"
    CreateBooking {
        #[serde(default)]
        room_id: String,
        #[serde(default)]
        date: String,
        #[serde(default)]
        start: String,
        #[serde(default)]
        end: String,
        #[serde(default)]
        notes: Option<String>,
    },

    GetBooking {
        id: String,
    },

    ListBookings {
        scope: ListFilter,
    },

    JoinBooking {
        id: String,
    },

    LeaveBooking {
        id: String,
    },

    CancelBooking {
        id: String,
    },

    DeleteBooking {
        id: String,
    },
}

impl RequestBody {
    /// Whether the request can be served without a session
    pub fn is_public(&self) -> bool {
        matches!(
            self,
            RequestBody::Ping
                | RequestBody::Register { .. }
                | RequestBody::Login { .. }
                | RequestBody::ListRooms
        )
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            RequestBody::Ping => "ping",
            RequestBody::Register { .. } => "register",
            RequestBody::Login { .. } => "login",
            RequestBody::Logout => "logout",
            RequestBody::Me => "me",
            RequestBody::ListRooms => "list_rooms",
            RequestBody::CreateBooking { .. } => "create_booking",
            RequestBody::GetBooking { .. } => "get_booking",
            RequestBody::ListBookings { .. } => "list_bookings",
            RequestBody::JoinBooking { .. } => "join_booking",
            RequestBody::LeaveBooking { .. } => "leave_booking",
            RequestBody::CancelBooking { .. } => "cancel_booking",
            RequestBody::DeleteBooking { .. } => "delete_booking",
        }
    }
}

/// Server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request this answers; 0 when the request was unreadable
    pub id: u64,
    pub body: ResponseBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseBody {
    Pong,

    Session {
        token: String,
        user: UserProfile,
    },

    LoggedOut,

    User(UserProfile),

    Rooms {
        rooms: Vec<Room>,
    },

    Booking(BookingView),

    Bookings {
        bookings: Vec<BookingView>,
    },

    Deleted {
        id: BookingId,
    },

    Error(ErrorBody),
}

impl ResponseBody {
    pub fn error(e: &CoreError) -> Self {
        ResponseBody::Error(ErrorBody::from(e))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ResponseBody::Error(_))
    }
}

/// A failed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code, e.g. `TIME_SLOT_CONFLICT`
    pub code: String,
    /// validation, conflict, authorization, not_found or infrastructure
    pub kind: String,
    /// HTTP-equivalent status
    pub status: u16,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: &str, kind: &str, status: u16, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            kind: kind.to_string(),
            status,
            message: message.into(),
        }
    }
}

impl From<&CoreError> for ErrorBody {
    fn from(e: &CoreError) -> Self {
        Self::new(e.code(), e.kind().as_str(), e.status_code(), e.to_string())
    }
}

/// Booking as clients see it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingView {
    pub id: BookingId,
    pub owner_id: UserId,
    pub room_id: RoomId,
    pub room_name: String,
    /// "YYYY-MM-DD"
    pub date: String,
    /// "HH:MM"
    pub start: String,
    /// "HH:MM"
    pub end: String,
    pub notes: String,
    /// "confirmed" or "cancelled"
    pub status: String,
    /// Owner first, then joined users in join order
    pub participants: Vec<UserId>,
    pub capacity: u32,
    /// active-empty, active-joined, active-full or cancelled
    pub state: String,
}

impl BookingView {
    /// `room` is `None` when the booking's room has left the catalog
    pub fn new(booking: &Booking, room: Option<&Room>) -> Self {
        let (room_name, capacity) = match room {
            Some(room) => (room.name.clone(), room.capacity),
            None => (booking.room_id.to_string(), 0),
        };
        let status = if booking.is_active() {
            "confirmed"
        } else {
            "cancelled"
        };

        Self {
            id: booking.id,
            owner_id: booking.owner_id,
            room_id: booking.room_id.clone(),
            room_name,
            date: format_date(&booking.start_time),
            start: format_clock(&booking.start_time),
            end: format_clock(&booking.end_time),
            notes: booking.notes.clone(),
            status: status.to_string(),
            participants: booking.attendees(),
            capacity,
            state: MembershipState::of(booking, capacity).as_str().to_string(),
        }
    }
}

impl Request {
    /// Serialize request to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize request from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl Response {
    /// Serialize response to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize response from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
