//! Network error types

use std::io;

use crate::protocol::ErrorBody;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    /// Framing is broken; the stream cannot be read further
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A well-framed payload that is not a valid message
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// The server answered with an error
    #[error("{} ({}): {}", .0.code, .0.status, .0.message)]
    Remote(ErrorBody),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Not logged in")]
    NotLoggedIn,
}

impl Error {
    /// Stable code of a server-side failure
    pub fn remote_code(&self) -> Option<&str> {
        match self {
            Error::Remote(body) => Some(&body.code),
            _ => None,
        }
    }
}
