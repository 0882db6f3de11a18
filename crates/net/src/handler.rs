//! Request dispatch
//!
//! Turns one decoded request into one response. Synchronous: storage is
//! blocking, so the server runs this on the blocking pool.

use std::str::FromStr;
use std::sync::Arc;

use roombook_core::{
    models::local_datetime, Accounts, Booking, BookingId, BookingService, Error as CoreError,
    IdentityProvider, ListScope, NewBooking, RequestContext, Result as CoreResult, RoomCatalog,
    RoomId, SessionIdentity, Storage, UserId,
};

use crate::protocol::{BookingView, ListFilter, Request, RequestBody, Response, ResponseBody};

pub struct Handler<S: Storage + ?Sized> {
    bookings: BookingService<S>,
    accounts: Accounts<S>,
    identity: SessionIdentity<S>,
}

impl<S: Storage + ?Sized> Handler<S> {
    pub fn new(
        store: Arc<S>,
        catalog: Arc<RoomCatalog>,
        policy: roombook_core::BookingPolicy,
        session_hours: i64,
    ) -> Self {
        Self {
            bookings: BookingService::new(Arc::clone(&store), catalog, policy),
            accounts: Accounts::new(Arc::clone(&store), session_hours),
            identity: SessionIdentity::new(store),
        }
    }

    pub fn bookings(&self) -> &BookingService<S> {
        &self.bookings
    }

    pub fn accounts(&self) -> &Accounts<S> {
        &self.accounts
    }

    /// Answer a request; failures become an `Error` body with the same id
    pub fn handle(&self, request: Request) -> Response {
        let body = self
            .dispatch(request.token, request.body)
            .unwrap_or_else(|e| ResponseBody::error(&e));
        Response {
            id: request.id,
            body,
        }
    }

    fn dispatch(&self, token: Option<String>, body: RequestBody) -> CoreResult<ResponseBody> {
        if body.is_public() {
            return self.dispatch_public(body);
        }
        let ctx = RequestContext { token };
        let user = self.identity.current_user_id(&ctx)?;
        self.dispatch_signed_in(&ctx, user, body)
    }

    /// Requests that need no session
    fn dispatch_public(&self, body: RequestBody) -> CoreResult<ResponseBody> {
        match body {
            RequestBody::Ping => Ok(ResponseBody::Pong),

            RequestBody::Register { username, password } => {
                let signed_in = self.accounts.register(&username, &password)?;
                Ok(ResponseBody::Session {
                    token: signed_in.session.token,
                    user: signed_in.user,
                })
            }

            RequestBody::Login { username, password } => {
                let signed_in = self.accounts.login(&username, &password)?;
                Ok(ResponseBody::Session {
                    token: signed_in.session.token,
                    user: signed_in.user,
                })
            }

            RequestBody::ListRooms => Ok(ResponseBody::Rooms {
                rooms: self.bookings.catalog().rooms().cloned().collect(),
            }),

            _ => Err(CoreError::Unauthenticated),
        }
    }

    fn dispatch_signed_in(
        &self,
        ctx: &RequestContext,
        user: UserId,
        body: RequestBody,
    ) -> CoreResult<ResponseBody> {
        let token = ctx.token.as_deref().unwrap_or_default();

        match body {
            RequestBody::Logout => {
                self.accounts.logout(token)?;
                Ok(ResponseBody::LoggedOut)
            }

            RequestBody::Me => Ok(ResponseBody::User(self.accounts.me(token)?)),

            RequestBody::CreateBooking {
                room_id,
                date,
                start,
                end,
                notes,
            } => {
                let room_id = required("room_id", &room_id)?;
                let date = required("date", &date)?;
                let start = required("start", &start)?;
                let end = required("end", &end)?;

                let new = NewBooking {
                    room_id: RoomId::from(room_id),
                    start: local_datetime(date, start)?,
                    end: local_datetime(date, end)?,
                    notes: notes.filter(|n| !n.trim().is_empty()),
                };
                let booking = self.bookings.create(user, new)?;
                Ok(self.booking_body(&booking))
            }

            RequestBody::GetBooking { id } => {
                let booking = self.bookings.get(booking_id(&id)?)?;
                Ok(self.booking_body(&booking))
            }

            RequestBody::ListBookings { scope } => {
                let scope = match scope {
                    ListFilter::Mine => ListScope::Mine(user),
                    ListFilter::Room(room_id) => {
                        ListScope::Room(RoomId::from(required("room", &room_id)?))
                    }
                };
                let bookings = self.bookings.list(&scope)?;
                Ok(ResponseBody::Bookings {
                    bookings: bookings.iter().map(|b| self.view(b)).collect(),
                })
            }

            RequestBody::JoinBooking { id } => {
                let booking = self.bookings.join(booking_id(&id)?, user)?;
                Ok(self.booking_body(&booking))
            }

            RequestBody::LeaveBooking { id } => {
                let booking = self.bookings.leave(booking_id(&id)?, user)?;
                Ok(self.booking_body(&booking))
            }

            RequestBody::CancelBooking { id } => {
                let booking = self.bookings.cancel(booking_id(&id)?, user)?;
                Ok(self.booking_body(&booking))
            }

            RequestBody::DeleteBooking { id } => {
                let id = booking_id(&id)?;
                self.bookings.delete(id, user)?;
                Ok(ResponseBody::Deleted { id })
            }

            public => self.dispatch_public(public),
        }
    }

    fn view(&self, booking: &Booking) -> BookingView {
        BookingView::new(booking, self.bookings.catalog().get(&booking.room_id).ok())
    }

    fn booking_body(&self, booking: &Booking) -> ResponseBody {
        ResponseBody::Booking(self.view(booking))
    }
}

/// Trimmed value, `MissingField` when blank
fn required<'a>(field: &'static str, value: &'a str) -> CoreResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CoreError::MissingField(field));
    }
    Ok(value)
}

/// An id that does not parse cannot name an existing booking
fn booking_id(id: &str) -> CoreResult<BookingId> {
    let id = required("id", id)?;
    BookingId::from_str(id).map_err(|_| CoreError::NotFound(format!("booking {}", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use roombook_core::{BookingPolicy, MemoryStore};

    fn handler() -> Handler<MemoryStore> {
        Handler::new(
            Arc::new(MemoryStore::new()),
            Arc::new(RoomCatalog::default()),
            BookingPolicy::default(),
            24,
        )
    }

    fn call(handler: &Handler<MemoryStore>, token: Option<&str>, body: RequestBody) -> ResponseBody {
        handler
            .handle(Request {
                id: 1,
                token: token.map(String::from),
                body,
            })
            .body
    }

    fn register(handler: &Handler<MemoryStore>, name: &str) -> String {
        match call(
            handler,
            None,
            RequestBody::Register {
                username: name.into(),
                password: "secret1".into(),
            },
        ) {
            ResponseBody::Session { token, .. } => token,
            other => panic!("Registration failed: {:?}", other),
        }
    }

    fn error_code(body: &ResponseBody) -> &str {
        match body {
            ResponseBody::Error(e) => &e.code,
            other => panic!("Expected error, got {:?}", other),
        }
    }

    fn create(
        handler: &Handler<MemoryStore>,
        token: &str,
        start: &str,
        end: &str,
    ) -> ResponseBody {
        call(
            handler,
            Some(token),
            RequestBody::CreateBooking {
                room_id: "r1".into(),
                date: "2024-06-01".into(),
                start: start.into(),
                end: end.into(),
                notes: None,
            },
        )
    }

    #[test]
    fn test_public_and_private_requests() {
        let handler = handler();
        assert_eq!(call(&handler, None, RequestBody::Ping), ResponseBody::Pong);
        assert!(matches!(
            call(&handler, None, RequestBody::ListRooms),
            ResponseBody::Rooms { ref rooms } if rooms.len() == 3
        ));

        let me = call(&handler, None, RequestBody::Me);
        assert_eq!(error_code(&me), "UNAUTHENTICATED");
        let bogus = call(&handler, Some("bogus"), RequestBody::Me);
        assert_eq!(error_code(&bogus), "UNAUTHENTICATED");
    }

    #[test]
    fn test_session_requirement_follows_request_kind() {
        let handler = handler();
        let token = register(&handler, "frank");

        let requests = vec![
            RequestBody::Ping,
            RequestBody::Login {
                username: "frank".into(),
                password: "secret1".into(),
            },
            RequestBody::ListRooms,
            RequestBody::Me,
            RequestBody::Logout,
            RequestBody::ListBookings {
                scope: ListFilter::Mine,
            },
            RequestBody::GetBooking {
                id: "not-a-uuid".into(),
            },
        ];

        for body in requests {
            let name = body.name();
            let public = body.is_public();
            let anonymous = call(&handler, None, body.clone());
            let rejected = matches!(
                anonymous,
                ResponseBody::Error(ref e) if e.code == "UNAUTHENTICATED"
            );
            assert_eq!(rejected, !public, "anonymous {}", name);

            if public {
                let signed_in = call(&handler, Some(&token), body);
                assert!(
                    !matches!(signed_in, ResponseBody::Error(_)),
                    "signed-in {} failed: {:?}",
                    name,
                    signed_in
                );
            }
        }
    }

    #[test]
    fn test_booking_flow() {
        let handler = handler();
        let alice = register(&handler, "alice");
        let bob = register(&handler, "bob");

        let view = match create(&handler, &alice, "09:00", "10:00") {
            ResponseBody::Booking(view) => view,
            other => panic!("Create failed: {:?}", other),
        };
        assert_eq!(view.status, "confirmed");
        assert_eq!(view.participants.len(), 1);

        let clash = create(&handler, &bob, "09:30", "10:30");
        assert_eq!(error_code(&clash), "TIME_SLOT_CONFLICT");

        let id = view.id.to_string();
        match call(&handler, Some(&bob), RequestBody::JoinBooking { id: id.clone() }) {
            ResponseBody::Booking(joined) => assert_eq!(joined.participants.len(), 2),
            other => panic!("Join failed: {:?}", other),
        }

        let forbidden = call(&handler, Some(&bob), RequestBody::CancelBooking { id: id.clone() });
        assert_eq!(error_code(&forbidden), "FORBIDDEN");

        match call(&handler, Some(&alice), RequestBody::CancelBooking { id: id.clone() }) {
            ResponseBody::Booking(cancelled) => assert_eq!(cancelled.status, "cancelled"),
            other => panic!("Cancel failed: {:?}", other),
        }

        match call(
            &handler,
            Some(&bob),
            RequestBody::ListBookings {
                scope: ListFilter::Mine,
            },
        ) {
            ResponseBody::Bookings { bookings } => assert_eq!(bookings.len(), 1),
            other => panic!("List failed: {:?}", other),
        }

        assert_eq!(
            call(&handler, Some(&alice), RequestBody::DeleteBooking { id }),
            ResponseBody::Deleted { id: view.id }
        );
    }

    #[test]
    fn test_create_field_validation() {
        let handler = handler();
        let token = register(&handler, "carol");

        let missing = call(
            &handler,
            Some(&token),
            RequestBody::CreateBooking {
                room_id: "r1".into(),
                date: " ".into(),
                start: "09:00".into(),
                end: "10:00".into(),
                notes: None,
            },
        );
        assert_eq!(error_code(&missing), "MISSING_FIELD");

        let bad_time = create(&handler, &token, "9am", "10:00");
        assert_eq!(error_code(&bad_time), "INVALID_DATE_TIME");

        let inverted = create(&handler, &token, "10:00", "09:00");
        assert_eq!(error_code(&inverted), "INVALID_TIME_RANGE");

        let unknown_room = call(
            &handler,
            Some(&token),
            RequestBody::ListBookings {
                scope: ListFilter::Room("r42".into()),
            },
        );
        assert_eq!(error_code(&unknown_room), "UNKNOWN_ROOM");
    }

    #[test]
    fn test_bad_booking_id_is_not_found() {
        let handler = handler();
        let token = register(&handler, "dave");
        let body = call(
            &handler,
            Some(&token),
            RequestBody::GetBooking {
                id: "not-a-uuid".into(),
            },
        );
        assert_eq!(error_code(&body), "NOT_FOUND");
    }

    #[test]
    fn test_logout_ends_session() {
        let handler = handler();
        let token = register(&handler, "erin");
        assert!(matches!(
            call(&handler, Some(&token), RequestBody::Me),
            ResponseBody::User(ref u) if u.username == "erin"
        ));
        assert_eq!(
            call(&handler, Some(&token), RequestBody::Logout),
            ResponseBody::LoggedOut
        );
        assert_eq!(
            error_code(&call(&handler, Some(&token), RequestBody::Me)),
            "UNAUTHENTICATED"
        );
    }
}
