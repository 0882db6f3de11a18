//! Membership engine for a single booking
//!
//! Governs who may join, leave, cancel or delete a booking. Checks are pure
//! and never mutate; `apply` performs a transition on a value that has
//! already passed its check. Persisting the result is the caller's job.

use crate::error::{Error, Result};
use crate::models::{Booking, BookingStatus, UserId};

/// Observable state of a booking's `(status, participants)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipState {
    /// Active, owner alone
    ActiveEmpty,
    /// Active, at least one joined participant, room not yet full
    ActiveJoined,
    /// Active, headcount equals room capacity
    ActiveFull,
    /// Terminal
    Cancelled,
}

impl MembershipState {
    pub fn of(booking: &Booking, capacity: u32) -> Self {
        if booking.status == BookingStatus::Cancelled {
            MembershipState::Cancelled
        } else if booking.headcount() >= capacity as usize {
            MembershipState::ActiveFull
        } else if booking.participants.is_empty() {
            MembershipState::ActiveEmpty
        } else {
            MembershipState::ActiveJoined
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipState::ActiveEmpty => "active-empty",
            MembershipState::ActiveJoined => "active-joined",
            MembershipState::ActiveFull => "active-full",
            MembershipState::Cancelled => "cancelled",
        }
    }
}

/// A transition requested by some user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipAction {
    Join,
    Leave,
    Cancel,
    Delete,
}

impl MembershipAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipAction::Join => "join",
            MembershipAction::Leave => "leave",
            MembershipAction::Cancel => "cancel",
            MembershipAction::Delete => "delete",
        }
    }
}

/// Decide whether `user` may perform `action` on `booking`
pub fn check(action: MembershipAction, booking: &Booking, capacity: u32, user: UserId) -> Result<()> {
    match action {
        MembershipAction::Join => check_join(booking, capacity, user),
        MembershipAction::Leave => check_leave(booking, user),
        MembershipAction::Cancel => check_cancel(booking, user),
        MembershipAction::Delete => check_delete(booking, user),
    }
}

/// Perform `action` for `user` on `booking`. Delete is a no-op here: removal
/// happens in the repository.
pub fn apply(action: MembershipAction, booking: &mut Booking, capacity: u32, user: UserId) -> Result<()> {
    check(action, booking, capacity, user)?;

    match action {
        MembershipAction::Join => booking.participants.push(user),
        MembershipAction::Leave => booking.participants.retain(|p| *p != user),
        // Participants are kept so prior attendance stays inspectable
        MembershipAction::Cancel => booking.status = BookingStatus::Cancelled,
        MembershipAction::Delete => {}
    }

    Ok(())
}

pub fn check_join(booking: &Booking, capacity: u32, user: UserId) -> Result<()> {
    if booking.is_owner(user) {
        return Err(Error::OwnerCannotJoinOwnBooking);
    }
    if !booking.is_active() {
        return Err(Error::BookingCancelled);
    }
    if booking.has_participant(user) {
        return Err(Error::AlreadyJoined);
    }
    if booking.headcount() >= capacity as usize {
        return Err(Error::RoomFull);
    }
    Ok(())
}

pub fn check_leave(booking: &Booking, user: UserId) -> Result<()> {
    if !booking.is_active() {
        return Err(Error::BookingCancelled);
    }
    if booking.is_owner(user) {
        return Err(Error::OwnerCannotLeave);
    }
    if !booking.has_participant(user) {
        return Err(Error::NotAParticipant);
    }
    Ok(())
}

pub fn check_cancel(booking: &Booking, actor: UserId) -> Result<()> {
    if !booking.is_owner(actor) {
        return Err(Error::Forbidden);
    }
    if !booking.is_active() {
        return Err(Error::BookingCancelled);
    }
    Ok(())
}

/// The owner may delete regardless of status or joined participants
pub fn check_delete(booking: &Booking, actor: UserId) -> Result<()> {
    if !booking.is_owner(actor) {
        return Err(Error::Forbidden);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RoomCatalog;
    use crate::models::{local_datetime, make_booking, BookingPolicy, RoomId};

    fn new_booking(owner: UserId) -> Booking {
        make_booking(
            &RoomCatalog::default(),
            &BookingPolicy::default(),
            owner,
            RoomId::from("r1"),
            local_datetime("2024-06-01", "09:00").unwrap(),
            local_datetime("2024-06-01", "10:00").unwrap(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_join_until_full() {
        let owner = UserId::new();
        let mut booking = new_booking(owner);
        assert_eq!(MembershipState::of(&booking, 3), MembershipState::ActiveEmpty);

        let u2 = UserId::new();
        apply(MembershipAction::Join, &mut booking, 3, u2).unwrap();
        assert_eq!(MembershipState::of(&booking, 3), MembershipState::ActiveJoined);

        let u3 = UserId::new();
        apply(MembershipAction::Join, &mut booking, 3, u3).unwrap();
        assert_eq!(MembershipState::of(&booking, 3), MembershipState::ActiveFull);

        let u4 = UserId::new();
        assert!(matches!(
            apply(MembershipAction::Join, &mut booking, 3, u4),
            Err(Error::RoomFull)
        ));
        assert_eq!(booking.participants, vec![u2, u3]);
    }

    #[test]
    fn test_capacity_two_scenario() {
        let u1 = UserId::new();
        let mut booking = new_booking(u1);

        apply(MembershipAction::Join, &mut booking, 2, UserId::new()).unwrap();
        assert_eq!(booking.headcount(), 2);
        assert!(matches!(
            check_join(&booking, 2, UserId::new()),
            Err(Error::RoomFull)
        ));
    }

    #[test]
    fn test_owner_cannot_join_even_when_cancelled() {
        let owner = UserId::new();
        let mut booking = new_booking(owner);
        assert!(matches!(
            check_join(&booking, 6, owner),
            Err(Error::OwnerCannotJoinOwnBooking)
        ));

        booking.status = BookingStatus::Cancelled;
        assert!(matches!(
            check_join(&booking, 6, owner),
            Err(Error::OwnerCannotJoinOwnBooking)
        ));
        assert!(!booking.participants.contains(&owner));
    }

    #[test]
    fn test_rejoin_is_reported() {
        let mut booking = new_booking(UserId::new());
        let u2 = UserId::new();
        apply(MembershipAction::Join, &mut booking, 6, u2).unwrap();
        assert!(matches!(
            apply(MembershipAction::Join, &mut booking, 6, u2),
            Err(Error::AlreadyJoined)
        ));
        assert_eq!(booking.participants.len(), 1);
    }

    #[test]
    fn test_leave_twice() {
        let mut booking = new_booking(UserId::new());
        let u2 = UserId::new();
        apply(MembershipAction::Join, &mut booking, 6, u2).unwrap();

        apply(MembershipAction::Leave, &mut booking, 6, u2).unwrap();
        assert!(matches!(
            apply(MembershipAction::Leave, &mut booking, 6, u2),
            Err(Error::NotAParticipant)
        ));
    }

    #[test]
    fn test_owner_cannot_leave() {
        let owner = UserId::new();
        let booking = new_booking(owner);
        assert!(matches!(
            check_leave(&booking, owner),
            Err(Error::OwnerCannotLeave)
        ));
    }

    #[test]
    fn test_cancel_preserves_participants() {
        let owner = UserId::new();
        let mut booking = new_booking(owner);
        let u2 = UserId::new();
        apply(MembershipAction::Join, &mut booking, 6, u2).unwrap();

        apply(MembershipAction::Cancel, &mut booking, 6, owner).unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert_eq!(booking.participants, vec![u2]);
        assert_eq!(MembershipState::of(&booking, 6), MembershipState::Cancelled);

        assert!(matches!(
            check_join(&booking, 6, UserId::new()),
            Err(Error::BookingCancelled)
        ));
        assert!(matches!(
            check_leave(&booking, u2),
            Err(Error::BookingCancelled)
        ));
        assert!(matches!(
            check_cancel(&booking, owner),
            Err(Error::BookingCancelled)
        ));
    }

    #[test]
    fn test_only_owner_cancels_or_deletes() {
        let owner = UserId::new();
        let mut booking = new_booking(owner);
        let stranger = UserId::new();
        apply(MembershipAction::Join, &mut booking, 6, stranger).unwrap();
        let before = booking.clone();

        assert!(matches!(
            apply(MembershipAction::Cancel, &mut booking, 6, stranger),
            Err(Error::Forbidden)
        ));
        assert!(matches!(
            check_delete(&booking, stranger),
            Err(Error::Forbidden)
        ));
        assert_eq!(booking, before);

        // Owner may delete even with participants present
        assert!(check_delete(&booking, owner).is_ok());
    }
}
