//! Roombook Network Library
//!
//! TCP transport for the booking service.
//!
//! # Architecture
//!
//! - **Server**: accepts connections and answers requests through a [`Handler`]
//! - **Client**: connects to a server and issues typed calls
//! - **Protocol**: length-prefixed JSON requests and responses
//!
//! # Usage
//!
//! ```ignore
//! let handler = Arc::new(Handler::new(store, catalog, policy, session_hours));
//! let server = Server::start(("127.0.0.1", DEFAULT_PORT), handler).await?;
//!
//! let mut client = Client::connect(server.addr()).await?;
//! client.register("alice", "secret1").await?;
//! let booking = client.create_booking("r1", "2024-06-01", "09:00", "10:00", None).await?;
//! ```

pub mod client;
pub mod error;
pub mod frame;
pub mod handler;
pub mod protocol;
pub mod server;

pub use client::Client;
pub use error::{Error, Result};
pub use handler::Handler;
pub use protocol::{BookingView, ErrorBody, ListFilter, Request, RequestBody, Response, ResponseBody};
pub use server::Server;

/// Default port for Roombook servers
pub const DEFAULT_PORT: u16 = roombook_core::config::DEFAULT_PORT;
