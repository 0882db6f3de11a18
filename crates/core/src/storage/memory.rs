//! In-memory storage backend
//!
//! Holds everything in process behind mutexes. The booking lock is held for
//! the whole of each check-then-write call, which makes it the single point
//! of serialization the SQLite backend gets from `BEGIN IMMEDIATE`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, instrument};

use super::traits::{BookingRepository, CreateCheck, Expected, Mutation, UserRepository};
use crate::conflict::ScopeKey;
use crate::error::{Error, Result};
use crate::invariants::{assert_booking_invariants, assert_no_overlaps};
use crate::models::{Booking, BookingId, Session, User, UserId};

#[derive(Default)]
struct Accounts {
    users: HashMap<UserId, User>,
    sessions: HashMap<String, Session>,
}

/// Storage kept entirely in memory; contents are lost on drop
#[derive(Default)]
pub struct MemoryStore {
    bookings: Mutex<HashMap<BookingId, Booking>>,
    accounts: Mutex<Accounts>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bookings(&self) -> Result<MutexGuard<'_, HashMap<BookingId, Booking>>> {
        self.bookings
            .lock()
            .map_err(|_| Error::RepositoryUnavailable("booking lock poisoned".into()))
    }

    fn accounts(&self) -> Result<MutexGuard<'_, Accounts>> {
        self.accounts
            .lock()
            .map_err(|_| Error::RepositoryUnavailable("account lock poisoned".into()))
    }
}

fn sorted(mut bookings: Vec<Booking>) -> Vec<Booking> {
    bookings.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then(a.created_at.cmp(&b.created_at))
    });
    bookings
}

fn not_found(id: BookingId) -> Error {
    Error::NotFound(format!("booking {}", id))
}

impl BookingRepository for MemoryStore {
    fn find(&self, id: BookingId) -> Result<Booking> {
        self.bookings()?.get(&id).cloned().ok_or_else(|| not_found(id))
    }

    fn find_by_scope(&self, scope: &ScopeKey, active_only: bool) -> Result<Vec<Booking>> {
        let bookings = self.bookings()?;
        Ok(sorted(
            bookings
                .values()
                .filter(|b| scope.covers(b) && (!active_only || b.is_active()))
                .cloned()
                .collect(),
        ))
    }

    fn list_for_member(&self, user_id: UserId) -> Result<Vec<Booking>> {
        let bookings = self.bookings()?;
        Ok(sorted(
            bookings
                .values()
                .filter(|b| b.is_attending(user_id))
                .cloned()
                .collect(),
        ))
    }

    #[instrument(skip(self, booking, check), fields(booking_id = %booking.id))]
    fn create_checked(
        &self,
        booking: Booking,
        scopes: &[ScopeKey],
        check: CreateCheck<'_>,
    ) -> Result<Booking> {
        assert_booking_invariants(&booking);
        let mut bookings = self.bookings()?;

        let existing: Vec<Booking> = bookings
            .values()
            .filter(|b| b.is_active() && scopes.iter().any(|s| s.covers(b)))
            .cloned()
            .collect();
        check(existing.as_slice())?;

        bookings.insert(booking.id, booking.clone());
        if cfg!(debug_assertions) {
            for scope in scopes {
                let scoped: Vec<Booking> =
                    bookings.values().filter(|b| scope.covers(b)).cloned().collect();
                assert_no_overlaps(&scoped);
            }
        }
        debug!("Booking created");
        Ok(booking)
    }

    #[instrument(skip(self, expected, mutation), fields(booking_id = %id))]
    fn conditional_update(
        &self,
        id: BookingId,
        expected: Expected<'_>,
        mutation: Mutation<'_>,
    ) -> Result<Booking> {
        let mut bookings = self.bookings()?;
        let current = bookings.get(&id).ok_or_else(|| not_found(id))?;
        if !expected(current) {
            debug!(version = current.version, "Precondition no longer holds");
            return Err(Error::ConflictFailed);
        }

        let mut next = current.clone();
        mutation(&mut next);
        next.id = current.id;
        next.room_id = current.room_id.clone();
        next.owner_id = current.owner_id;
        next.start_time = current.start_time;
        next.end_time = current.end_time;
        next.created_at = current.created_at;
        next.version = current.version + 1;
        next.updated_at = Utc::now();
        assert_booking_invariants(&next);

        bookings.insert(id, next.clone());
        debug!(version = next.version, "Booking updated");
        Ok(next)
    }

    #[instrument(skip(self, expected), fields(booking_id = %id))]
    fn delete_if(&self, id: BookingId, expected: Expected<'_>) -> Result<()> {
        let mut bookings = self.bookings()?;
        let current = bookings.get(&id).ok_or_else(|| not_found(id))?;
        if !expected(current) {
            return Err(Error::ConflictFailed);
        }
        bookings.remove(&id);
        debug!("Booking deleted");
        Ok(())
    }
}

impl UserRepository for MemoryStore {
    fn create_user(&self, user: &User) -> Result<()> {
        let mut accounts = self.accounts()?;
        if accounts.users.values().any(|u| u.username == user.username) {
            return Err(Error::UsernameTaken);
        }
        accounts.users.insert(user.id, user.clone());
        Ok(())
    }

    fn find_user_by_id(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.accounts()?.users.get(&id).cloned())
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .accounts()?
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    fn update_last_login(&self, user_id: UserId) -> Result<()> {
        if let Some(user) = self.accounts()?.users.get_mut(&user_id) {
            user.last_login = Some(Utc::now());
        }
        Ok(())
    }

    fn create_session(&self, session: &Session) -> Result<()> {
        self.accounts()?
            .sessions
            .insert(session.token.clone(), session.clone());
        Ok(())
    }

    fn find_valid_session(&self, token: &str) -> Result<Option<Session>> {
        Ok(self
            .accounts()?
            .sessions
            .get(token)
            .filter(|s| s.is_valid())
            .cloned())
    }

    fn delete_session(&self, token: &str) -> Result<()> {
        self.accounts()?.sessions.remove(token);
        Ok(())
    }

    fn cleanup_expired_sessions(&self) -> Result<u64> {
        let mut accounts = self.accounts()?;
        let before = accounts.sessions.len();
        accounts.sessions.retain(|_, s| s.is_valid());
        Ok((before - accounts.sessions.len()) as u64)
    }
}
