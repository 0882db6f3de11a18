//! Booking storage operations
//!
//! Every read-modify-write runs inside a `BEGIN IMMEDIATE` transaction, so
//! the write lock is held from the read to the commit. Updates additionally
//! guard on the stored version.

use chrono::Utc;
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use tracing::{debug, instrument};

use super::parse::{
    format_local, parse_booking_id, parse_datetime, parse_local, parse_status, parse_user_id,
    OptionalExt,
};
use super::traits::{CreateCheck, Expected, Mutation};
use crate::conflict::ScopeKey;
use crate::error::{Error, Result};
use crate::invariants::assert_booking_invariants;
use crate::models::{Booking, BookingId, BookingStatus, UserId};

const BOOKING_COLUMNS: &str =
    "id, room_id, owner_id, start_time, end_time, status, notes, created_at, updated_at, version";

pub struct BookingStore<'a> {
    conn: &'a Connection,
}

impl<'a> BookingStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Find booking by ID
    #[instrument(skip(self), fields(booking_id = %id))]
    pub fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>> {
        load(self.conn, id)
    }

    /// Bookings inside a scope, ordered by start time
    #[instrument(skip(self))]
    pub fn find_by_scope(&self, scope: &ScopeKey, active_only: bool) -> Result<Vec<Booking>> {
        load_scope(self.conn, scope, active_only)
    }

    /// Bookings a user owns or participates in
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn list_for_member(&self, user_id: UserId) -> Result<Vec<Booking>> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE owner_id = ?1
                OR id IN (SELECT booking_id FROM booking_participants WHERE user_id = ?1)
             ORDER BY start_time, created_at"
        );
        query_bookings(self.conn, &sql, params![user_id.to_string()])
    }

    /// Insert a booking if `check` passes against the scoped active bookings
    #[instrument(skip(self, booking, check), fields(booking_id = %booking.id, room_id = %booking.room_id))]
    pub fn create_checked(
        &self,
        booking: Booking,
        scopes: &[ScopeKey],
        check: CreateCheck<'_>,
    ) -> Result<Booking> {
        assert_booking_invariants(&booking);
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let mut existing = Vec::new();
        for scope in scopes {
            existing.extend(load_scope(&tx, scope, true)?);
        }
        check(existing.as_slice())?;

        tx.execute(
            "INSERT INTO bookings (id, room_id, owner_id, start_time, end_time, status, notes, created_at, updated_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                booking.id.to_string(),
                booking.room_id.as_str(),
                booking.owner_id.to_string(),
                format_local(&booking.start_time),
                format_local(&booking.end_time),
                booking.status.as_str(),
                booking.notes,
                booking.created_at.to_rfc3339(),
                booking.updated_at.to_rfc3339(),
                booking.version,
            ],
        )?;
        write_participants(&tx, &booking)?;
        tx.commit()?;

        debug!("Booking created");
        Ok(booking)
    }

    /// Compare-and-swap update of status, notes and participants
    #[instrument(skip(self, expected, mutation), fields(booking_id = %id))]
    pub fn conditional_update(
        &self,
        id: BookingId,
        expected: Expected<'_>,
        mutation: Mutation<'_>,
    ) -> Result<Booking> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let current = load(&tx, id)?.ok_or_else(|| not_found(id))?;
        if !expected(&current) {
            debug!(version = current.version, "Precondition no longer holds");
            return Err(Error::ConflictFailed);
        }

        let mut next = current.clone();
        mutation(&mut next);
        // Identity and window are immutable whatever the mutation did
        next.id = current.id;
        next.room_id = current.room_id.clone();
        next.owner_id = current.owner_id;
        next.start_time = current.start_time;
        next.end_time = current.end_time;
        next.created_at = current.created_at;
        next.version = current.version + 1;
        next.updated_at = Utc::now();
        assert_booking_invariants(&next);

        let updated = tx.execute(
            "UPDATE bookings SET status = ?1, notes = ?2, updated_at = ?3, version = ?4
             WHERE id = ?5 AND version = ?6",
            params![
                next.status.as_str(),
                next.notes,
                next.updated_at.to_rfc3339(),
                next.version,
                id.to_string(),
                current.version,
            ],
        )?;
        if updated == 0 {
            return Err(Error::ConflictFailed);
        }

        write_participants(&tx, &next)?;
        tx.commit()?;

        debug!(version = next.version, status = next.status.as_str(), "Booking updated");
        Ok(next)
    }

    /// Delete a booking if `expected` holds; participants cascade
    #[instrument(skip(self, expected), fields(booking_id = %id))]
    pub fn delete_if(&self, id: BookingId, expected: Expected<'_>) -> Result<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let current = load(&tx, id)?.ok_or_else(|| not_found(id))?;
        if !expected(&current) {
            return Err(Error::ConflictFailed);
        }

        let deleted = tx.execute(
            "DELETE FROM bookings WHERE id = ?1 AND version = ?2",
            params![id.to_string(), current.version],
        )?;
        if deleted == 0 {
            return Err(Error::ConflictFailed);
        }
        tx.commit()?;

        debug!("Booking deleted");
        Ok(())
    }
}

fn not_found(id: BookingId) -> Error {
    Error::NotFound(format!("booking {}", id))
}

fn load(conn: &Connection, id: BookingId) -> Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1");
    let booking = conn
        .query_row(&sql, params![id.to_string()], booking_from_row)
        .optional()?;

    match booking {
        Some(mut b) => {
            b.participants = load_participants(conn, b.id)?;
            Ok(Some(b))
        }
        None => Ok(None),
    }
}

fn load_scope(conn: &Connection, scope: &ScopeKey, active_only: bool) -> Result<Vec<Booking>> {
    let (column, key) = match scope {
        ScopeKey::Room(room_id) => ("room_id", room_id.as_str().to_string()),
        ScopeKey::User(user_id) => ("owner_id", user_id.to_string()),
    };
    let status_filter = if active_only {
        format!(" AND status = '{}'", BookingStatus::Active.as_str())
    } else {
        String::new()
    };
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE {column} = ?1{status_filter}
         ORDER BY start_time, created_at"
    );
    query_bookings(conn, &sql, params![key])
}

fn query_bookings(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Booking>> {
    let mut stmt = conn.prepare(sql)?;
    let mut bookings = stmt
        .query_map(params, booking_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for booking in &mut bookings {
        booking.participants = load_participants(conn, booking.id)?;
    }
    Ok(bookings)
}

fn booking_from_row(row: &Row<'_>) -> rusqlite::Result<Booking> {
    Ok(Booking {
        id: parse_booking_id(&row.get::<_, String>(0)?)?,
        room_id: row.get::<_, String>(1)?.as_str().into(),
        owner_id: parse_user_id(&row.get::<_, String>(2)?)?,
        start_time: parse_local(&row.get::<_, String>(3)?)?,
        end_time: parse_local(&row.get::<_, String>(4)?)?,
        participants: Vec::new(),
        status: parse_status(&row.get::<_, String>(5)?)?,
        notes: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?)?,
        updated_at: parse_datetime(&row.get::<_, String>(8)?)?,
        version: row.get(9)?,
    })
}

fn load_participants(conn: &Connection, booking_id: BookingId) -> Result<Vec<UserId>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM booking_participants WHERE booking_id = ?1 ORDER BY position",
    )?;
    let participants = stmt
        .query_map(params![booking_id.to_string()], |row| {
            parse_user_id(&row.get::<_, String>(0)?)
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(participants)
}

fn write_participants(conn: &Connection, booking: &Booking) -> Result<()> {
    conn.execute(
        "DELETE FROM booking_participants WHERE booking_id = ?1",
        params![booking.id.to_string()],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO booking_participants (booking_id, user_id, position) VALUES (?1, ?2, ?3)",
    )?;
    for (position, user_id) in booking.participants.iter().enumerate() {
        stmt.execute(params![
            booking.id.to_string(),
            user_id.to_string(),
            position as i64
        ])?;
    }
    Ok(())
}
