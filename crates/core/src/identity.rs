//! Resolving the calling user
//!
//! The booking core only ever sees a `UserId`; how a request is tied to one
//! is up to the identity provider.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::UserId;
use crate::storage::UserRepository;

/// Whatever a transport knows about the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub token: Option<String>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }
}

/// Maps a request to the user making it
pub trait IdentityProvider: Send + Sync {
    /// `Unauthenticated` if the caller cannot be identified
    fn current_user_id(&self, ctx: &RequestContext) -> Result<UserId>;
}

/// Resolves bearer tokens against stored, non-expired sessions
pub struct SessionIdentity<S: UserRepository + ?Sized> {
    store: Arc<S>,
}

impl<S: UserRepository + ?Sized> SessionIdentity<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: UserRepository + ?Sized> IdentityProvider for SessionIdentity<S> {
    fn current_user_id(&self, ctx: &RequestContext) -> Result<UserId> {
        let token = ctx
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(Error::Unauthenticated)?;

        self.store
            .find_valid_session(token)?
            .map(|s| s.user_id)
            .ok_or(Error::Unauthenticated)
    }
}

/// Trusts a fixed user; for embedding and tests
pub struct FixedIdentity(pub UserId);

impl IdentityProvider for FixedIdentity {
    fn current_user_id(&self, _ctx: &RequestContext) -> Result<UserId> {
        Ok(self.0)
    }
}
