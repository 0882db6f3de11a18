//! Booking service
//!
//! Composes the booking entity, the conflict detector and the membership
//! engine over a repository. Every write is a single atomic repository call:
//! creation through `create_checked`, transitions through a version-guarded
//! `conditional_update` or `delete_if`.

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::catalog::RoomCatalog;
use crate::conflict::{ensure_clear, scopes_for, ScopeKey};
use crate::error::{Error, Result};
use crate::invariants::assert_within_capacity;
use crate::membership::{self, MembershipAction, MembershipState};
use crate::models::{make_booking, Booking, BookingId, BookingPolicy, Room, RoomId, UserId};
use crate::storage::BookingRepository;

/// Input for a new booking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub room_id: RoomId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub notes: Option<String>,
}

/// Which bookings to list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    /// Owned or joined by the user, any status
    Mine(UserId),
    /// Every booking in one room, any status
    Room(RoomId),
}

/// Who is in a booking and how full it is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupancy {
    /// Owner first, then joined participants
    pub attendees: Vec<UserId>,
    pub capacity: u32,
    pub state: MembershipState,
}

impl Occupancy {
    pub fn headcount(&self) -> usize {
        self.attendees.len()
    }
}

pub struct BookingService<R: BookingRepository + ?Sized> {
    repo: Arc<R>,
    catalog: Arc<RoomCatalog>,
    policy: BookingPolicy,
}

impl<R: BookingRepository + ?Sized> Clone for BookingService<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            catalog: Arc::clone(&self.catalog),
            policy: self.policy.clone(),
        }
    }
}

impl<R: BookingRepository + ?Sized> BookingService<R> {
    pub fn new(repo: Arc<R>, catalog: Arc<RoomCatalog>, policy: BookingPolicy) -> Self {
        Self {
            repo,
            catalog,
            policy,
        }
    }

    pub fn catalog(&self) -> &RoomCatalog {
        &self.catalog
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    pub fn room(&self, room_id: &RoomId) -> Result<&Room> {
        self.catalog
            .get(room_id)
            .map_err(|_| Error::UnknownRoom(room_id.to_string()))
    }

    /// Validate and store a new booking. The conflict check and the insert
    /// happen in one repository call.
    pub fn create(&self, owner: UserId, new: NewBooking) -> Result<Booking> {
        let booking = make_booking(
            &self.catalog,
            &self.policy,
            owner,
            new.room_id,
            new.start,
            new.end,
            new.notes,
        )?;
        let scopes = scopes_for(&self.policy, &booking);
        let candidate = booking.clone();

        self.repo.create_checked(booking, &scopes, &|existing| {
            ensure_clear(existing, &scopes, &candidate)
        })
    }

    pub fn join(&self, id: BookingId, user: UserId) -> Result<Booking> {
        self.transition(MembershipAction::Join, id, user)
    }

    pub fn leave(&self, id: BookingId, user: UserId) -> Result<Booking> {
        self.transition(MembershipAction::Leave, id, user)
    }

    pub fn cancel(&self, id: BookingId, user: UserId) -> Result<Booking> {
        self.transition(MembershipAction::Cancel, id, user)
    }

    pub fn delete(&self, id: BookingId, user: UserId) -> Result<()> {
        retry_once(|| {
            let current = self.repo.find(id)?;
            membership::check_delete(&current, user)?;
            let version = current.version;
            self.repo.delete_if(id, &|stored| stored.version == version)
        })
    }

    pub fn get(&self, id: BookingId) -> Result<Booking> {
        self.repo.find(id)
    }

    pub fn list(&self, scope: &ListScope) -> Result<Vec<Booking>> {
        match scope {
            ListScope::Mine(user) => self.repo.list_for_member(*user),
            ListScope::Room(room_id) => {
                if !self.catalog.contains(room_id) {
                    return Err(Error::UnknownRoom(room_id.to_string()));
                }
                self.repo
                    .find_by_scope(&ScopeKey::Room(room_id.clone()), false)
            }
        }
    }

    pub fn occupancy(&self, booking: &Booking) -> Result<Occupancy> {
        let capacity = self.room(&booking.room_id)?.capacity;
        Ok(Occupancy {
            attendees: booking.attendees(),
            capacity,
            state: MembershipState::of(booking, capacity),
        })
    }

    /// Read, validate, then write guarded on the validated version
    fn transition(&self, action: MembershipAction, id: BookingId, user: UserId) -> Result<Booking> {
        retry_once(|| {
            let current = self.repo.find(id)?;

            // Only join needs the room; leave and cancel never grow the set
            let mut next = current.clone();
            if action == MembershipAction::Join {
                let capacity = self.room(&current.room_id)?.capacity;
                membership::apply(action, &mut next, capacity, user)?;
                assert_within_capacity(&next, capacity);
            } else {
                membership::apply(action, &mut next, u32::MAX, user)?;
            }

            let version = current.version;
            self.repo.conditional_update(
                id,
                &|stored| stored.version == version,
                &|stored| {
                    stored.status = next.status;
                    stored.participants = next.participants.clone();
                },
            )
        })
    }
}

/// Run `op`, repeating it once if it lost a race
fn retry_once<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    match op() {
        Err(Error::ConflictFailed) => op(),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use crate::models::{local_datetime, BookingStatus};
    use crate::storage::{Database, Expected, MemoryStore, Mutation};

    fn at(time: &str) -> NaiveDateTime {
        local_datetime("2024-06-01", time).unwrap()
    }

    fn new_booking(room: &str, start: &str, end: &str) -> NewBooking {
        NewBooking {
            room_id: RoomId::from(room),
            start: at(start),
            end: at(end),
            notes: None,
        }
    }

    fn small_catalog() -> Arc<RoomCatalog> {
        Arc::new(RoomCatalog::new(vec![Room::new("r1", "Room A", 2), Room::new("r2", "Room B", 10)]).unwrap())
    }

    fn memory_service() -> BookingService<MemoryStore> {
        BookingService::new(
            Arc::new(MemoryStore::new()),
            small_catalog(),
            BookingPolicy::default(),
        )
    }

    fn sqlite_service() -> BookingService<Database> {
        BookingService::new(
            Arc::new(Database::open_in_memory().unwrap()),
            small_catalog(),
            BookingPolicy::default(),
        )
    }

    #[test]
    fn test_conflict_scenario() {
        let service = memory_service();
        let (u1, u2, u3) = (UserId::new(), UserId::new(), UserId::new());

        let first = service.create(u1, new_booking("r1", "09:00", "10:00")).unwrap();
        assert!(matches!(
            service.create(u2, new_booking("r1", "09:30", "10:30")),
            Err(Error::TimeSlotConflict)
        ));
        // Back-to-back is fine
        service.create(u3, new_booking("r1", "10:00", "11:00")).unwrap();

        // Cancelled bookings free their slot
        service.cancel(first.id, u1).unwrap();
        service.create(u2, new_booking("r1", "09:30", "10:00")).unwrap();
    }

    #[test]
    fn test_capacity_scenario() {
        let service = sqlite_service();
        let (u1, u2, u3) = (UserId::new(), UserId::new(), UserId::new());

        let b = service.create(u1, new_booking("r1", "09:00", "10:00")).unwrap();
        let joined = service.join(b.id, u2).unwrap();
        assert_eq!(joined.participants, vec![u2]);
        assert_eq!(joined.version, b.version + 1);

        assert!(matches!(service.join(b.id, u3), Err(Error::RoomFull)));

        let occupancy = service.occupancy(&service.get(b.id).unwrap()).unwrap();
        assert_eq!(occupancy.attendees, vec![u1, u2]);
        assert_eq!(occupancy.state, MembershipState::ActiveFull);

        service.leave(b.id, u2).unwrap();
        service.join(b.id, u3).unwrap();
        assert_eq!(service.get(b.id).unwrap().participants, vec![u3]);
    }

    #[test]
    fn test_failed_validation_writes_nothing() {
        let service = memory_service();
        let owner = UserId::new();
        let stranger = UserId::new();
        let b = service.create(owner, new_booking("r2", "09:00", "10:00")).unwrap();

        assert!(matches!(service.cancel(b.id, stranger), Err(Error::Forbidden)));
        assert!(matches!(service.delete(b.id, stranger), Err(Error::Forbidden)));
        assert!(matches!(
            service.join(b.id, owner),
            Err(Error::OwnerCannotJoinOwnBooking)
        ));
        assert!(matches!(service.leave(b.id, owner), Err(Error::OwnerCannotLeave)));
        assert!(matches!(
            service.leave(b.id, stranger),
            Err(Error::NotAParticipant)
        ));
        assert_eq!(service.get(b.id).unwrap(), b);
    }

    #[test]
    fn test_create_validation_order() {
        let service = memory_service();
        let owner = UserId::new();
        assert!(matches!(
            service.create(owner, new_booking("r9", "10:00", "09:00")),
            Err(Error::InvalidTimeRange)
        ));
        assert!(matches!(
            service.create(owner, new_booking("r9", "08:00", "13:00")),
            Err(Error::DurationExceeded { .. })
        ));
        assert!(matches!(
            service.create(owner, new_booking("r9", "09:00", "10:00")),
            Err(Error::UnknownRoom(_))
        ));
    }

    #[test]
    fn test_per_user_scope() {
        let service = BookingService::new(
            Arc::new(MemoryStore::new()),
            small_catalog(),
            BookingPolicy::default().with_per_user_conflicts(true),
        );
        let owner = UserId::new();
        service.create(owner, new_booking("r1", "09:00", "10:00")).unwrap();
        assert!(matches!(
            service.create(owner, new_booking("r2", "09:30", "10:30")),
            Err(Error::TimeSlotConflict)
        ));
        service
            .create(UserId::new(), new_booking("r2", "09:30", "10:30"))
            .unwrap();
    }

    #[test]
    fn test_delete_and_list() {
        let service = sqlite_service();
        let owner = UserId::new();
        let joiner = UserId::new();
        let late = service.create(owner, new_booking("r2", "14:00", "15:00")).unwrap();
        let early = service.create(owner, new_booking("r2", "09:00", "10:00")).unwrap();
        service.join(late.id, joiner).unwrap();

        let mine: Vec<BookingId> = service
            .list(&ListScope::Mine(owner))
            .unwrap()
            .iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(mine, vec![early.id, late.id]);
        assert_eq!(service.list(&ListScope::Mine(joiner)).unwrap().len(), 1);
        assert_eq!(
            service.list(&ListScope::Room(RoomId::from("r2"))).unwrap().len(),
            2
        );
        assert!(matches!(
            service.list(&ListScope::Room(RoomId::from("nope"))),
            Err(Error::UnknownRoom(_))
        ));

        // Owner deletes even with a participant present
        service.delete(late.id, owner).unwrap();
        assert!(matches!(service.get(late.id), Err(Error::NotFound(_))));
        assert!(service.list(&ListScope::Mine(joiner)).unwrap().is_empty());
    }

    #[test]
    fn test_cancelled_booking_rejects_membership_changes() {
        let service = memory_service();
        let owner = UserId::new();
        let u2 = UserId::new();
        let b = service.create(owner, new_booking("r2", "09:00", "10:00")).unwrap();
        service.join(b.id, u2).unwrap();

        let cancelled = service.cancel(b.id, owner).unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.participants, vec![u2]);

        assert!(matches!(service.join(b.id, UserId::new()), Err(Error::BookingCancelled)));
        assert!(matches!(service.leave(b.id, u2), Err(Error::BookingCancelled)));
        assert!(matches!(service.cancel(b.id, owner), Err(Error::BookingCancelled)));
        service.delete(b.id, owner).unwrap();
    }

    /// Loses the first `losses` conditional writes, as if another writer got
    /// there first
    struct Racy {
        inner: MemoryStore,
        losses: AtomicUsize,
    }

    impl Racy {
        fn lose(&self) -> bool {
            self.losses
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    impl BookingRepository for Racy {
        fn find(&self, id: BookingId) -> Result<Booking> {
            self.inner.find(id)
        }
        fn find_by_scope(&self, scope: &ScopeKey, active_only: bool) -> Result<Vec<Booking>> {
            self.inner.find_by_scope(scope, active_only)
        }
        fn list_for_member(&self, user_id: UserId) -> Result<Vec<Booking>> {
            self.inner.list_for_member(user_id)
        }
        fn create_checked(
            &self,
            booking: Booking,
            scopes: &[ScopeKey],
            check: crate::storage::CreateCheck<'_>,
        ) -> Result<Booking> {
            self.inner.create_checked(booking, scopes, check)
        }
        fn conditional_update(
            &self,
            id: BookingId,
            expected: Expected<'_>,
            mutation: Mutation<'_>,
        ) -> Result<Booking> {
            if self.lose() {
                return Err(Error::ConflictFailed);
            }
            self.inner.conditional_update(id, expected, mutation)
        }
        fn delete_if(&self, id: BookingId, expected: Expected<'_>) -> Result<()> {
            if self.lose() {
                return Err(Error::ConflictFailed);
            }
            self.inner.delete_if(id, expected)
        }
    }

    fn racy_service(losses: usize) -> BookingService<Racy> {
        BookingService::new(
            Arc::new(Racy {
                inner: MemoryStore::new(),
                losses: AtomicUsize::new(losses),
            }),
            small_catalog(),
            BookingPolicy::default(),
        )
    }

    impl BookingService<Racy> {
        fn with_losses(self, losses: usize) -> Self {
            self.repo.losses.store(losses, Ordering::SeqCst);
            self
        }
    }

    #[test]
    fn test_single_lost_race_is_retried() {
        let service = racy_service(0);
        let b = service.create(UserId::new(), new_booking("r2", "09:00", "10:00")).unwrap();
        let service = service.with_losses(1);

        let u2 = UserId::new();
        assert_eq!(service.join(b.id, u2).unwrap().participants, vec![u2]);
    }

    #[test]
    fn test_second_lost_race_surfaces() {
        let service = racy_service(0);
        let owner = UserId::new();
        let b = service.create(owner, new_booking("r2", "09:00", "10:00")).unwrap();
        let service = service.with_losses(2);

        let result = service.cancel(b.id, owner);
        assert!(matches!(result, Err(ref e) if e.is_retryable()));
        assert!(service.get(b.id).unwrap().is_active());

        let service = service.with_losses(2);
        assert!(matches!(service.delete(b.id, owner), Err(Error::ConflictFailed)));
        assert!(service.get(b.id).is_ok());
    }

    #[test]
    fn test_concurrent_creates_admit_one() {
        let service = sqlite_service();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                thread::spawn(move || service.create(UserId::new(), new_booking("r1", "09:00", "10:00")))
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(created, 1);
        assert_eq!(
            service.list(&ListScope::Room(RoomId::from("r1"))).unwrap().len(),
            1
        );
    }

    /// Every joiner keeps retrying lost races until it is in or turned away
    fn fill_concurrently<R: BookingRepository + ?Sized + 'static>(service: BookingService<R>) {
        let b = service.create(UserId::new(), new_booking("r2", "09:00", "10:00")).unwrap();
        let capacity = service.room(&b.room_id).unwrap().capacity as usize;

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let service = service.clone();
                thread::spawn(move || {
                    let user = UserId::new();
                    loop {
                        match service.join(b.id, user) {
                            Err(Error::ConflictFailed) => continue,
                            other => return (user, other),
                        }
                    }
                })
            })
            .collect();

        let mut joined = Vec::new();
        let mut turned_away = 0;
        for handle in handles {
            match handle.join().unwrap() {
                (user, Ok(_)) => joined.push(user),
                (_, Err(Error::RoomFull)) => turned_away += 1,
                (_, Err(e)) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(joined.len(), capacity - 1);
        assert_eq!(turned_away, 20 - (capacity - 1));

        let stored = service.get(b.id).unwrap();
        assert_eq!(stored.headcount(), capacity);
        assert_eq!(stored.participants.len(), joined.len());
        assert!(joined.iter().all(|u| stored.has_participant(*u)));
        crate::invariants::assert_booking_invariants(&stored);
    }

    #[test]
    fn test_concurrent_joins_fill_exactly_to_capacity_sqlite() {
        fill_concurrently(sqlite_service());
    }

    #[test]
    fn test_concurrent_joins_fill_exactly_to_capacity_memory() {
        fill_concurrently(memory_service());
    }

    fn catalog_with(rooms: Vec<Room>) -> Arc<RoomCatalog> {
        Arc::new(RoomCatalog::new(rooms).unwrap())
    }

    #[test]
    fn test_leave_and_cancel_after_capacity_shrinks() {
        let store = Arc::new(MemoryStore::new());
        let roomy = BookingService::new(
            Arc::clone(&store),
            catalog_with(vec![Room::new("r1", "Room A", 6)]),
            BookingPolicy::default(),
        );
        let owner = UserId::new();
        let (u2, u3, u4) = (UserId::new(), UserId::new(), UserId::new());
        let b = roomy.create(owner, new_booking("r1", "09:00", "10:00")).unwrap();
        for user in [u2, u3, u4] {
            roomy.join(b.id, user).unwrap();
        }

        let cramped = BookingService::new(
            store,
            catalog_with(vec![Room::new("r1", "Room A", 2)]),
            BookingPolicy::default(),
        );
        assert!(matches!(cramped.join(b.id, UserId::new()), Err(Error::RoomFull)));

        let left = cramped.leave(b.id, u2).unwrap();
        assert_eq!(left.participants, vec![u3, u4]);

        let cancelled = cramped.cancel(b.id, owner).unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.participants, vec![u3, u4]);
    }

    #[test]
    fn test_leave_and_cancel_after_room_removed() {
        let store = Arc::new(MemoryStore::new());
        let before = BookingService::new(
            Arc::clone(&store),
            catalog_with(vec![Room::new("r1", "Room A", 4), Room::new("r2", "Room B", 4)]),
            BookingPolicy::default(),
        );
        let owner = UserId::new();
        let guest = UserId::new();
        let b = before.create(owner, new_booking("r1", "09:00", "10:00")).unwrap();
        before.join(b.id, guest).unwrap();

        let after = BookingService::new(
            store,
            catalog_with(vec![Room::new("r2", "Room B", 4)]),
            BookingPolicy::default(),
        );
        assert!(matches!(
            after.join(b.id, UserId::new()),
            Err(Error::UnknownRoom(ref id)) if id == "r1"
        ));
        assert!(after.leave(b.id, guest).unwrap().participants.is_empty());
        assert!(!after.cancel(b.id, owner).unwrap().is_active());
        after.delete(b.id, owner).unwrap();
    }
}
