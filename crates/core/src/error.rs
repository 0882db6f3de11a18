//! Error types for Roombook Core

use thiserror::Error;

/// Broad classification of a failure, used by transports to pick a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller supplied bad input; never retried
    Validation,
    /// State conflict (overlap, capacity, lost race)
    Conflict,
    /// Wrong actor for the operation
    Authorization,
    /// Booking or room absent
    NotFound,
    /// Store or session infrastructure
    Infrastructure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Authorization => "authorization",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Infrastructure => "infrastructure",
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    // Validation
    #[error("End time must be later than start time")]
    InvalidTimeRange,

    #[error("Booking duration exceeds {max_minutes} minutes")]
    DurationExceeded { max_minutes: i64 },

    #[error("Unknown room: {0}")]
    UnknownRoom(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid date or time: {0}")]
    InvalidDateTime(String),

    #[error("Notes exceed {max} characters")]
    NotesTooLong { max: usize },

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Password must be at least {min} characters")]
    WeakPassword { min: usize },

    // Conflict
    #[error("Time slot conflicts with an existing booking")]
    TimeSlotConflict,

    #[error("Room is full")]
    RoomFull,

    #[error("Already joined this booking")]
    AlreadyJoined,

    #[error("Booking changed concurrently, retry")]
    ConflictFailed,

    #[error("Username already taken")]
    UsernameTaken,

    // Authorization
    #[error("Only the booking owner may do this")]
    Forbidden,

    #[error("Owner cannot join their own booking")]
    OwnerCannotJoinOwnBooking,

    #[error("Owner cannot leave their own booking; cancel or delete it instead")]
    OwnerCannotLeave,

    #[error("Not a participant of this booking")]
    NotAParticipant,

    #[error("Booking is cancelled")]
    BookingCancelled,

    #[error("Invalid credentials")]
    InvalidCredentials,

    // Not found
    #[error("Not found: {0}")]
    NotFound(String),

    // Infrastructure
    #[error("Repository unavailable: {0}")]
    RepositoryUnavailable(String),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidTimeRange
            | Error::DurationExceeded { .. }
            | Error::UnknownRoom(_)
            | Error::MissingField(_)
            | Error::InvalidDateTime(_)
            | Error::NotesTooLong { .. }
            | Error::InvalidUsername(_)
            | Error::WeakPassword { .. } => ErrorKind::Validation,

            Error::TimeSlotConflict
            | Error::RoomFull
            | Error::AlreadyJoined
            | Error::ConflictFailed
            | Error::UsernameTaken => ErrorKind::Conflict,

            Error::Forbidden
            | Error::OwnerCannotJoinOwnBooking
            | Error::OwnerCannotLeave
            | Error::NotAParticipant
            | Error::BookingCancelled
            | Error::InvalidCredentials => ErrorKind::Authorization,

            Error::NotFound(_) => ErrorKind::NotFound,

            Error::RepositoryUnavailable(_)
            | Error::Unauthenticated
            | Error::Database(_)
            | Error::Config(_)
            | Error::PasswordHash(_)
            | Error::Io(_)
            | Error::Serialization(_) => ErrorKind::Infrastructure,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidTimeRange => "INVALID_TIME_RANGE",
            Error::DurationExceeded { .. } => "DURATION_EXCEEDED",
            Error::UnknownRoom(_) => "UNKNOWN_ROOM",
            Error::MissingField(_) => "MISSING_FIELD",
            Error::InvalidDateTime(_) => "INVALID_DATE_TIME",
            Error::NotesTooLong { .. } => "NOTES_TOO_LONG",
            Error::InvalidUsername(_) => "INVALID_USERNAME",
            Error::WeakPassword { .. } => "WEAK_PASSWORD",
            Error::TimeSlotConflict => "TIME_SLOT_CONFLICT",
            Error::RoomFull => "ROOM_FULL",
            Error::AlreadyJoined => "ALREADY_JOINED",
            Error::ConflictFailed => "CONFLICT_FAILED",
            Error::UsernameTaken => "USERNAME_TAKEN",
            Error::Forbidden => "FORBIDDEN",
            Error::OwnerCannotJoinOwnBooking => "OWNER_CANNOT_JOIN_OWN_BOOKING",
            Error::OwnerCannotLeave => "OWNER_CANNOT_LEAVE",
            Error::NotAParticipant => "NOT_A_PARTICIPANT",
            Error::BookingCancelled => "BOOKING_CANCELLED",
            Error::InvalidCredentials => "INVALID_CREDENTIALS",
            Error::NotFound(_) => "NOT_FOUND",
            Error::RepositoryUnavailable(_) => "REPOSITORY_UNAVAILABLE",
            Error::Unauthenticated => "UNAUTHENTICATED",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::PasswordHash(_) => "PASSWORD_HASH_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// HTTP-equivalent status, for transports that speak in those terms
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Unauthenticated | Error::InvalidCredentials => 401,
            Error::RepositoryUnavailable(_) => 503,
            Error::Database(_)
            | Error::Config(_)
            | Error::PasswordHash(_)
            | Error::Io(_)
            | Error::Serialization(_) => 500,
            _ => match self.kind() {
                ErrorKind::Validation => 400,
                ErrorKind::Conflict => 409,
                ErrorKind::Authorization => 403,
                ErrorKind::NotFound => 404,
                ErrorKind::Infrastructure => 500,
            },
        }
    }

    /// A lost race or a transient store outage; everything else is final
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ConflictFailed | Error::RepositoryUnavailable(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                Error::RepositoryUnavailable(e.to_string())
            }
            _ => Error::Database(e),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
