//! Roombook Core Library
//!
//! Booking model, conflict detection, membership rules, accounts and storage
//! for the Roombook room-booking service.

pub mod accounts;
pub mod catalog;
pub mod config;
pub mod conflict;
pub mod error;
pub mod identity;
pub mod invariants;
pub mod membership;
pub mod models;
pub mod service;
pub mod storage;

pub use accounts::{Accounts, SignedIn};
pub use catalog::RoomCatalog;
pub use config::{AppConfig, StorageBackend};
pub use conflict::ScopeKey;
pub use error::{Error, ErrorKind, Result};
pub use identity::{IdentityProvider, RequestContext, SessionIdentity};
pub use membership::{MembershipAction, MembershipState};
pub use models::*;
pub use service::{BookingService, ListScope, NewBooking, Occupancy};
pub use storage::{BookingRepository, Database, MemoryStore, Storage, UserRepository};
