//! Storage repository traits
//!
//! These traits define the storage interface, allowing for different
//! implementations (SQLite, in-memory). Every read-modify-write goes through
//! a single call so the backend can make it atomic.

use crate::conflict::ScopeKey;
use crate::error::Result;
use crate::models::{Booking, BookingId, Session, User, UserId};

/// Guard evaluated against the stored booking before a write
pub type Expected<'a> = &'a dyn Fn(&Booking) -> bool;

/// Change applied to the stored booking once the guard holds
pub type Mutation<'a> = &'a dyn Fn(&mut Booking);

/// Check run against the scoped bookings before an insert
pub type CreateCheck<'a> = &'a dyn Fn(&[Booking]) -> Result<()>;

/// Booking repository operations
pub trait BookingRepository: Send + Sync {
    /// Find booking by ID, `NotFound` if absent
    fn find(&self, id: BookingId) -> Result<Booking>;

    /// Bookings inside a conflict scope, ordered by start time
    fn find_by_scope(&self, scope: &ScopeKey, active_only: bool) -> Result<Vec<Booking>>;

    /// Bookings a user owns or has joined, any status, ordered by start time
    fn list_for_member(&self, user_id: UserId) -> Result<Vec<Booking>>;

    /// Atomically load the active bookings of every scope, run `check` on
    /// them and insert `booking` only if it passes
    fn create_checked(
        &self,
        booking: Booking,
        scopes: &[ScopeKey],
        check: CreateCheck<'_>,
    ) -> Result<Booking>;

    /// Compare-and-swap: apply `mutation` only if `expected` still holds for
    /// the stored booking, else `ConflictFailed`. Bumps `version` and
    /// `updated_at`. Identity, room, owner and window are immutable.
    fn conditional_update(
        &self,
        id: BookingId,
        expected: Expected<'_>,
        mutation: Mutation<'_>,
    ) -> Result<Booking>;

    /// Remove the booking only if `expected` still holds, else
    /// `ConflictFailed`
    fn delete_if(&self, id: BookingId, expected: Expected<'_>) -> Result<()>;

    /// Insert without any conflict check
    fn create(&self, booking: Booking) -> Result<Booking> {
        self.create_checked(booking, &[], &|_| Ok(()))
    }

    /// Remove unconditionally
    fn delete(&self, id: BookingId) -> Result<()> {
        self.delete_if(id, &|_| true)
    }
}

/// User and session repository operations
pub trait UserRepository: Send + Sync {
    /// Create a new user, `UsernameTaken` on a duplicate name
    fn create_user(&self, user: &User) -> Result<()>;

    /// Find user by ID
    fn find_user_by_id(&self, id: UserId) -> Result<Option<User>>;

    /// Find user by username
    fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Update user's last login time
    fn update_last_login(&self, user_id: UserId) -> Result<()>;

    /// Create a session
    fn create_session(&self, session: &Session) -> Result<()>;

    /// Find a valid (non-expired) session
    fn find_valid_session(&self, token: &str) -> Result<Option<Session>>;

    /// Delete a session
    fn delete_session(&self, token: &str) -> Result<()>;

    /// Clean up expired sessions
    fn cleanup_expired_sessions(&self) -> Result<u64>;
}

/// Combined storage interface
///
/// Implementations may be backed by SQLite or memory.
pub trait Storage: BookingRepository + UserRepository {}

// Blanket implementation: any type implementing all traits implements Storage
impl<T> Storage for T where T: BookingRepository + UserRepository {}
