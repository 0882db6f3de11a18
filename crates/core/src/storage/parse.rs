//! Database value parsing utilities
//!
//! Provides error-safe parsing of stored values.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Error as SqlError;
use uuid::Uuid;

use crate::models::{BookingId, BookingStatus, UserId};

/// Storage format of local wall-clock booking windows; sorts as text
pub const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn conversion_error<E>(e: E) -> SqlError
where
    E: std::error::Error + Send + Sync + 'static,
{
    SqlError::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}

/// Parse a UUID from a database string column
pub fn parse_uuid(s: &str) -> Result<Uuid, SqlError> {
    Uuid::parse_str(s).map_err(conversion_error)
}

pub fn parse_user_id(s: &str) -> Result<UserId, SqlError> {
    parse_uuid(s).map(UserId)
}

pub fn parse_booking_id(s: &str) -> Result<BookingId, SqlError> {
    parse_uuid(s).map(BookingId)
}

/// Parse a DateTime from an RFC3339 string
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, SqlError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(conversion_error)
}

/// Parse an optional DateTime from an RFC3339 string
pub fn parse_datetime_opt(s: Option<String>) -> Result<Option<DateTime<Utc>>, SqlError> {
    s.map(|s| parse_datetime(&s)).transpose()
}

/// Parse a local booking time
pub fn parse_local(s: &str) -> Result<NaiveDateTime, SqlError> {
    NaiveDateTime::parse_from_str(s, LOCAL_FORMAT).map_err(conversion_error)
}

pub fn format_local(t: &NaiveDateTime) -> String {
    t.format(LOCAL_FORMAT).to_string()
}

/// Convert a stored status string; unknown values are a conversion failure
pub fn parse_status(s: &str) -> Result<BookingStatus, SqlError> {
    s.parse::<BookingStatus>().map_err(conversion_error)
}

/// Extension trait for converting rusqlite Results to Option
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, SqlError>;
}

impl<T> OptionalExt<T> for Result<T, SqlError> {
    fn optional(self) -> Result<Option<T>, SqlError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(SqlError::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
