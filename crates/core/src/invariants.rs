//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use std::collections::HashSet;

use uuid::Uuid;

use crate::conflict::overlaps;
use crate::models::Booking;

/// Validate that a booking's state is internally consistent
pub fn assert_booking_invariants(booking: &Booking) {
    debug_assert!(
        booking.end_time > booking.start_time,
        "Booking {} ends at {} before it starts at {}",
        booking.id,
        booking.end_time,
        booking.start_time
    );

    debug_assert!(
        booking.owner_id.0 != Uuid::nil(),
        "Booking {} has nil owner_id",
        booking.id
    );

    // The owner attends implicitly and is never stored as a participant
    debug_assert!(
        !booking.participants.contains(&booking.owner_id),
        "Booking {} lists its owner {} as a participant",
        booking.id,
        booking.owner_id
    );

    let unique: HashSet<_> = booking.participants.iter().collect();
    debug_assert!(
        unique.len() == booking.participants.len(),
        "Booking {} has duplicate participants",
        booking.id
    );
}

/// Validate that the headcount never exceeds the room capacity
pub fn assert_within_capacity(booking: &Booking, capacity: u32) {
    debug_assert!(
        booking.headcount() <= capacity as usize,
        "Booking {} has {} attendees in a room of {}",
        booking.id,
        booking.headcount(),
        capacity
    );
}

/// Validate that no two active bookings in the slice overlap
pub fn assert_no_overlaps(bookings: &[Booking]) {
    let active: Vec<&Booking> = bookings.iter().filter(|b| b.is_active()).collect();
    for (i, a) in active.iter().enumerate() {
        for b in &active[i + 1..] {
            debug_assert!(
                !overlaps(a.start_time, a.end_time, b.start_time, b.end_time),
                "Active bookings {} and {} overlap",
                a.id,
                b.id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RoomCatalog;
    use crate::models::{local_datetime, make_booking, BookingPolicy, BookingStatus, RoomId, UserId};

    fn booking(start: &str, end: &str) -> Booking {
        make_booking(
            &RoomCatalog::default(),
            &BookingPolicy::default(),
            UserId::new(),
            RoomId::from("r1"),
            local_datetime("2024-06-01", start).unwrap(),
            local_datetime("2024-06-01", end).unwrap(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_booking_passes() {
        let mut b = booking("09:00", "10:00");
        b.participants.push(UserId::new());
        assert_booking_invariants(&b);
        assert_within_capacity(&b, 2);
    }

    #[test]
    #[should_panic(expected = "as a participant")]
    #[cfg(debug_assertions)]
    fn test_owner_as_participant_panics() {
        let mut b = booking("09:00", "10:00");
        b.participants.push(b.owner_id);
        assert_booking_invariants(&b);
    }

    #[test]
    #[should_panic(expected = "duplicate participants")]
    #[cfg(debug_assertions)]
    fn test_duplicate_participant_panics() {
        let mut b = booking("09:00", "10:00");
        let u = UserId::new();
        b.participants.push(u);
        b.participants.push(u);
        assert_booking_invariants(&b);
    }

    #[test]
    fn test_back_to_back_and_cancelled_do_not_overlap() {
        let mut cancelled = booking("09:30", "10:30");
        cancelled.status = BookingStatus::Cancelled;
        assert_no_overlaps(&[
            booking("09:00", "10:00"),
            booking("10:00", "11:00"),
            cancelled,
        ]);
    }

    #[test]
    #[should_panic(expected = "overlap")]
    #[cfg(debug_assertions)]
    fn test_overlapping_active_panics() {
        assert_no_overlaps(&[booking("09:00", "10:00"), booking("09:30", "10:30")]);
    }
}
