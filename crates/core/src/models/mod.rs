//! Data models for Roombook

mod booking;
mod ids;
mod room;
mod user;

pub use booking::*;
pub use ids::*;
pub use room::*;
pub use user::*;
