//! Storage layer for Roombook
//!
//! Two backends implement the repository traits: [`Database`] on SQLite and
//! [`MemoryStore`] in process.

mod bookings;
mod memory;
mod migrations;
mod parse;
mod traits;
mod users;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::Connection;
use tracing::instrument;

use crate::conflict::ScopeKey;
use crate::error::{Error, Result};
use crate::models::{Booking, BookingId, Session, User, UserId};

pub use bookings::BookingStore;
pub use memory::MemoryStore;
pub use parse::LOCAL_FORMAT;
pub use traits::{BookingRepository, CreateCheck, Expected, Mutation, Storage, UserRepository};
pub use users::UserStore;

/// Default time a writer waits on a locked database
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Main database handle
///
/// The connection sits behind a mutex so the handle can be shared across
/// threads; each repository call holds it for its whole transaction.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Self::init(conn)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    /// Enable foreign keys and bring the schema up to date
    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get current schema version
    pub fn schema_version(&self) -> Result<u32> {
        let conn = self.conn()?;
        migrations::get_current_version(&conn)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::RepositoryUnavailable("connection lock poisoned".into()))
    }

    /// Run `f` with a booking store over the locked connection
    fn with_bookings<T>(&self, f: impl FnOnce(&BookingStore<'_>) -> Result<T>) -> Result<T> {
        let conn = self.conn()?;
        f(&BookingStore::new(&conn))
    }

    /// Run `f` with a user store over the locked connection
    fn with_users<T>(&self, f: impl FnOnce(&UserStore<'_>) -> Result<T>) -> Result<T> {
        let conn = self.conn()?;
        f(&UserStore::new(&conn))
    }
}

// Implement repository traits for Database
// This enables using Database through the trait interface

impl BookingRepository for Database {
    fn find(&self, id: BookingId) -> Result<Booking> {
        self.with_bookings(|s| s.find_by_id(id))?
            .ok_or_else(|| Error::NotFound(format!("booking {}", id)))
    }

    fn find_by_scope(&self, scope: &ScopeKey, active_only: bool) -> Result<Vec<Booking>> {
        self.with_bookings(|s| s.find_by_scope(scope, active_only))
    }

    fn list_for_member(&self, user_id: UserId) -> Result<Vec<Booking>> {
        self.with_bookings(|s| s.list_for_member(user_id))
    }

    fn create_checked(
        &self,
        booking: Booking,
        scopes: &[ScopeKey],
        check: CreateCheck<'_>,
    ) -> Result<Booking> {
        self.with_bookings(|s| s.create_checked(booking, scopes, check))
    }

    fn conditional_update(
        &self,
        id: BookingId,
        expected: Expected<'_>,
        mutation: Mutation<'_>,
    ) -> Result<Booking> {
        self.with_bookings(|s| s.conditional_update(id, expected, mutation))
    }

    fn delete_if(&self, id: BookingId, expected: Expected<'_>) -> Result<()> {
        self.with_bookings(|s| s.delete_if(id, expected))
    }
}

impl UserRepository for Database {
    fn create_user(&self, user: &User) -> Result<()> {
        self.with_users(|s| s.create(user))
    }

    fn find_user_by_id(&self, id: UserId) -> Result<Option<User>> {
        self.with_users(|s| s.find_by_id(id))
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.with_users(|s| s.find_by_username(username))
    }

    fn update_last_login(&self, user_id: UserId) -> Result<()> {
        self.with_users(|s| s.update_last_login(user_id))
    }

    fn create_session(&self, session: &Session) -> Result<()> {
        self.with_users(|s| s.create_session(session))
    }

    fn find_valid_session(&self, token: &str) -> Result<Option<Session>> {
        self.with_users(|s| s.find_valid_session(token))
    }

    fn delete_session(&self, token: &str) -> Result<()> {
        self.with_users(|s| s.delete_session(token))
    }

    fn cleanup_expired_sessions(&self) -> Result<u64> {
        self.with_users(|s| s.cleanup_expired_sessions())
    }
}
