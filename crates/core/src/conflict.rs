//! Booking conflict detection
//!
//! Intervals are half-open `[start, end)`: a booking that ends exactly when
//! another begins does not conflict with it. Only active bookings take part.

use chrono::NaiveDateTime;

use crate::error::{Error, Result};
use crate::models::{Booking, BookingId, BookingPolicy, RoomId, UserId};

/// Dimension across which overlapping bookings are disallowed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    /// No two active bookings in the same room may overlap
    Room(RoomId),
    /// No two active bookings owned by the same user may overlap
    User(UserId),
}

impl ScopeKey {
    /// Does this booking fall inside the scope?
    pub fn covers(&self, booking: &Booking) -> bool {
        match self {
            ScopeKey::Room(room_id) => &booking.room_id == room_id,
            ScopeKey::User(user_id) => booking.owner_id == *user_id,
        }
    }
}

/// `[s1, e1)` and `[s2, e2)` overlap iff `max(s1, s2) < min(e1, e2)`
pub fn overlaps(
    s1: NaiveDateTime,
    e1: NaiveDateTime,
    s2: NaiveDateTime,
    e2: NaiveDateTime,
) -> bool {
    s1.max(s2) < e1.min(e2)
}

/// Does the proposed window overlap an active booking within `scope`?
///
/// `exclude` omits one booking, so a booking can be re-validated against the
/// others without colliding with itself.
pub fn has_conflict<'a, I>(
    existing: I,
    scope: &ScopeKey,
    start: NaiveDateTime,
    end: NaiveDateTime,
    exclude: Option<BookingId>,
) -> bool
where
    I: IntoIterator<Item = &'a Booking>,
{
    existing.into_iter().any(|b| {
        b.is_active()
            && Some(b.id) != exclude
            && scope.covers(b)
            && overlaps(b.start_time, b.end_time, start, end)
    })
}

/// Scopes that apply to a new booking under `policy`. Per-room always applies.
pub fn scopes_for(policy: &BookingPolicy, booking: &Booking) -> Vec<ScopeKey> {
    let mut scopes = vec![ScopeKey::Room(booking.room_id.clone())];
    if policy.per_user_conflicts {
        scopes.push(ScopeKey::User(booking.owner_id));
    }
    scopes
}

/// Fail with `TimeSlotConflict` if `booking` overlaps anything in `existing`
/// under any of `scopes`
pub fn ensure_clear(existing: &[Booking], scopes: &[ScopeKey], booking: &Booking) -> Result<()> {
    let clash = scopes.iter().any(|scope| {
        has_conflict(
            existing,
            scope,
            booking.start_time,
            booking.end_time,
            Some(booking.id),
        )
    });

    if clash {
        Err(Error::TimeSlotConflict)
    } else {
        Ok(())
    }
}
