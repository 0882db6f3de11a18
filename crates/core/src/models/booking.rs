//! Booking model - a reserved time window on one room
//!
//! Booking windows are local wall-clock times (`NaiveDateTime`); there is no
//! time-zone handling. Creation/update stamps are UTC bookkeeping only.

use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BookingId, RoomId, UserId};
use crate::catalog::RoomCatalog;
use crate::error::{Error, Result};

/// Default ceiling on a single booking's length
pub const DEFAULT_MAX_DURATION_MINUTES: i64 = 4 * 60;

/// Longest accepted notes, in characters
pub const MAX_NOTES_LEN: usize = 500;

/// Booking lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Counts for conflict checks and accepts joins
    Active,
    /// Terminal; kept for history
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Active => "active",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

/// A status string that names neither state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown booking status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for BookingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(BookingStatus::Active),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A booking. The owner is implicitly a participant and is never stored in
/// `participants`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub room_id: RoomId,
    pub owner_id: UserId,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    /// Non-owner attendees in join order
    pub participants: Vec<UserId>,
    pub status: BookingStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by every stored mutation; guards conditional updates
    pub version: u64,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Active
    }

    pub fn is_owner(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }

    /// Whether `user_id` has joined (the owner is not counted here)
    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.participants.contains(&user_id)
    }

    /// Whether `user_id` attends at all, owner included
    pub fn is_attending(&self, user_id: UserId) -> bool {
        self.is_owner(user_id) || self.has_participant(user_id)
    }

    /// Number of people attending, owner included
    pub fn headcount(&self) -> usize {
        self.participants.len() + 1
    }

    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    /// Owner first, then joined participants
    pub fn attendees(&self) -> Vec<UserId> {
        std::iter::once(self.owner_id)
            .chain(self.participants.iter().copied())
            .collect()
    }
}

/// Rules applied when a booking is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingPolicy {
    /// `None` disables the ceiling
    pub max_duration: Option<Duration>,
    /// Also forbid one owner holding two overlapping bookings in any room
    pub per_user_conflicts: bool,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            max_duration: Some(Duration::minutes(DEFAULT_MAX_DURATION_MINUTES)),
            per_user_conflicts: false,
        }
    }
}

impl BookingPolicy {
    pub fn with_max_duration_minutes(mut self, minutes: i64) -> Self {
        self.max_duration = if minutes > 0 {
            Duration::try_minutes(minutes)
        } else {
            None
        };
        self
    }

    pub fn with_per_user_conflicts(mut self, enabled: bool) -> Self {
        self.per_user_conflicts = enabled;
        self
    }
}

/// Validate and construct a new active booking with no joined participants.
///
/// Pure: nothing is stored. The returned booking carries a fresh id and
/// version 0.
pub fn make_booking(
    catalog: &RoomCatalog,
    policy: &BookingPolicy,
    owner_id: UserId,
    room_id: RoomId,
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
    notes: Option<String>,
) -> Result<Booking> {
    if end_time <= start_time {
        return Err(Error::InvalidTimeRange);
    }

    if let Some(max) = policy.max_duration {
        if end_time - start_time > max {
            return Err(Error::DurationExceeded {
                max_minutes: max.num_minutes(),
            });
        }
    }

    if !catalog.contains(&room_id) {
        return Err(Error::UnknownRoom(room_id.0));
    }

    let notes = notes.unwrap_or_default();
    if notes.chars().count() > MAX_NOTES_LEN {
        return Err(Error::NotesTooLong { max: MAX_NOTES_LEN });
    }

    let now = Utc::now();
    Ok(Booking {
        id: BookingId::new(),
        room_id,
        owner_id,
        start_time,
        end_time,
        participants: Vec::new(),
        status: BookingStatus::Active,
        notes,
        created_at: now,
        updated_at: now,
        version: 0,
    })
}

/// Build a local wall-clock time from "YYYY-MM-DD" and "HH:MM"
pub fn local_datetime(date: &str, time: &str) -> Result<NaiveDateTime> {
    let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| Error::InvalidDateTime(format!("date '{}'", date)))?;
    let clock = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .map_err(|_| Error::InvalidDateTime(format!("time '{}'", time)))?;
    Ok(day.and_time(clock))
}

/// "YYYY-MM-DD" of a local time
pub fn format_date(t: &NaiveDateTime) -> String {
    t.format("%Y-%m-%d").to_string()
}

/// "HH:MM" of a local time
pub fn format_clock(t: &NaiveDateTime) -> String {
    t.format("%H:%M").to_string()
}
