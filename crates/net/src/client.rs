//! TCP client for a booking server
//!
//! Strictly request/response: every call writes one frame and waits for the
//! answer carrying the same id.

use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info};

use roombook_core::{BookingId, Room, UserProfile};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{BookingView, ListFilter, Request, RequestBody, Response, ResponseBody};

/// Client handle for network operations
pub struct Client {
    reader: ReadHalf<TcpStream>,
    writer: WriteHalf<TcpStream>,
    next_id: u64,
    /// Token of the current session, set by `register` and `login`
    token: Option<String>,
}

impl Client {
    /// Connect to a booking server
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        info!(addr = %stream.peer_addr()?, "Connected to server");

        let (reader, writer) = tokio::io::split(stream);
        Ok(Client {
            reader,
            writer,
            next_id: 1,
            token: None,
        })
    }

    /// Current session token
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Use an existing session token for later calls
    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    /// Send one request and wait for its response
    pub async fn call(&mut self, token: Option<&str>, body: RequestBody) -> Result<ResponseBody> {
        let id = self.next_id;
        self.next_id += 1;

        let request = Request {
            id,
            token: token.map(String::from),
            body,
        };
        debug!(id, request = request.body.name(), "Sending request");
        write_frame(&mut self.writer, &request).await?;

        let response: Response = read_frame(&mut self.reader).await?;
        if response.id != id {
            // id 0 answers a request the server could not read
            if let ResponseBody::Error(e) = response.body {
                return Err(Error::Remote(e));
            }
            return Err(Error::Protocol(format!(
                "Response id {} does not match request {}",
                response.id, id
            )));
        }
        Ok(response.body)
    }

    /// Call with the stored session token, turning error bodies into `Err`
    async fn request(&mut self, body: RequestBody) -> Result<ResponseBody> {
        let token = self.token.clone();
        match self.call(token.as_deref(), body).await? {
            ResponseBody::Error(e) => Err(Error::Remote(e)),
            other => Ok(other),
        }
    }

    pub async fn ping(&mut self) -> Result<()> {
        match self.request(RequestBody::Ping).await? {
            ResponseBody::Pong => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Create an account; the new session becomes the client's
    pub async fn register(&mut self, username: &str, password: &str) -> Result<UserProfile> {
        let body = RequestBody::Register {
            username: username.to_string(),
            password: password.to_string(),
        };
        self.sign_in(body).await
    }

    /// Log in; the new session becomes the client's
    pub async fn login(&mut self, username: &str, password: &str) -> Result<UserProfile> {
        let body = RequestBody::Login {
            username: username.to_string(),
            password: password.to_string(),
        };
        self.sign_in(body).await
    }

    async fn sign_in(&mut self, body: RequestBody) -> Result<UserProfile> {
        match self.request(body).await? {
            ResponseBody::Session { token, user } => {
                self.token = Some(token);
                Ok(user)
            }
            other => Err(unexpected(other)),
        }
    }

    pub async fn logout(&mut self) -> Result<()> {
        if self.token.is_none() {
            return Err(Error::NotLoggedIn);
        }
        match self.request(RequestBody::Logout).await? {
            ResponseBody::LoggedOut => {
                self.token = None;
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }

    pub async fn me(&mut self) -> Result<UserProfile> {
        match self.request(RequestBody::Me).await? {
            ResponseBody::User(user) => Ok(user),
            other => Err(unexpected(other)),
        }
    }

    pub async fn list_rooms(&mut self) -> Result<Vec<Room>> {
        match self.request(RequestBody::ListRooms).await? {
            ResponseBody::Rooms { rooms } => Ok(rooms),
            other => Err(unexpected(other)),
        }
    }

    /// Book `room_id` on `date` ("YYYY-MM-DD") from `start` to `end` ("HH:MM")
    pub async fn create_booking(
        &mut self,
        room_id: &str,
        date: &str,
        start: &str,
        end: &str,
        notes: Option<&str>,
    ) -> Result<BookingView> {
        let body = RequestBody::CreateBooking {
            room_id: room_id.to_string(),
            date: date.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            notes: notes.map(String::from),
        };
        self.booking(body).await
    }

    pub async fn get_booking(&mut self, id: BookingId) -> Result<BookingView> {
        self.booking(RequestBody::GetBooking { id: id.to_string() })
            .await
    }

    pub async fn list_bookings(&mut self, scope: ListFilter) -> Result<Vec<BookingView>> {
        match self.request(RequestBody::ListBookings { scope }).await? {
            ResponseBody::Bookings { bookings } => Ok(bookings),
            other => Err(unexpected(other)),
        }
    }

    pub async fn join_booking(&mut self, id: BookingId) -> Result<BookingView> {
        self.booking(RequestBody::JoinBooking { id: id.to_string() })
            .await
    }

    pub async fn leave_booking(&mut self, id: BookingId) -> Result<BookingView> {
        self.booking(RequestBody::LeaveBooking { id: id.to_string() })
            .await
    }

    pub async fn cancel_booking(&mut self, id: BookingId) -> Result<BookingView> {
        self.booking(RequestBody::CancelBooking { id: id.to_string() })
            .await
    }

    pub async fn delete_booking(&mut self, id: BookingId) -> Result<()> {
        match self
            .request(RequestBody::DeleteBooking { id: id.to_string() })
            .await?
        {
            ResponseBody::Deleted { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn booking(&mut self, body: RequestBody) -> Result<BookingView> {
        match self.request(body).await? {
            ResponseBody::Booking(view) => Ok(view),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(body: ResponseBody) -> Error {
    Error::UnexpectedResponse(format!("{:?}", body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use roombook_core::{BookingPolicy, MemoryStore, RoomCatalog};

    use crate::handler::Handler;
    use crate::server::Server;

    async fn start_server() -> Server {
        let handler = Arc::new(Handler::new(
            Arc::new(MemoryStore::new()),
            Arc::new(RoomCatalog::default()),
            BookingPolicy::default(),
            24,
        ));
        Server::start("127.0.0.1:0", handler).await.unwrap()
    }

    #[tokio::test]
    async fn test_client_connect() {
        let server = start_server().await;

        // Connect client
        let mut client = Client::connect(server.addr()).await.unwrap();
        client.ping().await.unwrap();
        assert_eq!(client.list_rooms().await.unwrap().len(), 3);

        server.shutdown();
    }

    #[tokio::test]
    async fn test_session_token_is_tracked() {
        let server = start_server().await;
        let mut client = Client::connect(server.addr()).await.unwrap();

        assert!(matches!(client.logout().await, Err(Error::NotLoggedIn)));
        let err = client.me().await.unwrap_err();
        assert_eq!(err.remote_code(), Some("UNAUTHENTICATED"));

        let user = client.register("frank", "secret1").await.unwrap();
        assert!(client.token().is_some());
        assert_eq!(client.me().await.unwrap(), user);

        client.logout().await.unwrap();
        assert!(client.token().is_none());

        server.shutdown();
    }
}
