//! Account registration, login and sessions

use std::sync::{Arc, OnceLock};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;

use crate::error::{Error, Result};
use crate::models::{Session, User, UserProfile};
use crate::storage::UserRepository;

pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 32;
pub const MIN_PASSWORD_LEN: usize = 6;

/// Default session lifetime: one week
pub const DEFAULT_SESSION_HOURS: i64 = 24 * 7;

const TOKEN_BYTES: usize = 32;

/// A freshly issued session together with its user
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub session: Session,
    pub user: UserProfile,
}

pub struct Accounts<S: UserRepository + ?Sized> {
    store: Arc<S>,
    session_hours: i64,
}

impl<S: UserRepository + ?Sized> Clone for Accounts<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            session_hours: self.session_hours,
        }
    }
}

impl<S: UserRepository + ?Sized> Accounts<S> {
    pub fn new(store: Arc<S>, session_hours: i64) -> Self {
        Self {
            store,
            session_hours,
        }
    }

    /// Create an account and sign it in
    pub fn register(&self, username: &str, password: &str) -> Result<SignedIn> {
        let username = validate_username(username)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::WeakPassword {
                min: MIN_PASSWORD_LEN,
            });
        }

        if self.store.find_user_by_username(&username)?.is_some() {
            return Err(Error::UsernameTaken);
        }

        let user = User::new(username, hash_password(password)?);
        // The store still rejects a duplicate that raced past the lookup
        self.store.create_user(&user)?;
        self.start_session(&user)
    }

    /// Verify credentials and issue a new session
    pub fn login(&self, username: &str, password: &str) -> Result<SignedIn> {
        let Some(user) = self.store.find_user_by_username(username.trim())? else {
            // Unknown names cost one argon2 verification like known ones
            if let Some(hash) = decoy_hash() {
                let _ = verify_password(password, hash);
            }
            return Err(Error::InvalidCredentials);
        };

        verify_password(password, &user.password_hash)?;
        self.store.update_last_login(user.id)?;
        self.start_session(&user)
    }

    /// End a session; unknown tokens are ignored
    pub fn logout(&self, token: &str) -> Result<()> {
        self.store.delete_session(token)
    }

    /// Profile of the session's user
    pub fn me(&self, token: &str) -> Result<UserProfile> {
        let session = self
            .store
            .find_valid_session(token)?
            .ok_or(Error::Unauthenticated)?;
        let user = self
            .store
            .find_user_by_id(session.user_id)?
            .ok_or(Error::Unauthenticated)?;
        Ok(UserProfile::from(&user))
    }

    /// Drop sessions past their expiry
    pub fn purge_expired(&self) -> Result<u64> {
        self.store.cleanup_expired_sessions()
    }

    fn start_session(&self, user: &User) -> Result<SignedIn> {
        let session = Session::new(new_token(), user.id, self.session_hours);
        self.store.create_session(&session)?;
        Ok(SignedIn {
            session,
            user: UserProfile::from(user),
        })
    }
}

/// Trimmed username if it is 3 to 32 characters of `[A-Za-z0-9_.-]`
pub fn validate_username(username: &str) -> Result<String> {
    let username = username.trim();
    let len = username.chars().count();

    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
        return Err(Error::InvalidUsername(format!(
            "must be {}-{} characters",
            MIN_USERNAME_LEN, MAX_USERNAME_LEN
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(Error::InvalidUsername(
            "only letters, digits, '_', '.' and '-' are allowed".into(),
        ));
    }

    Ok(username.to_string())
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| Error::PasswordHash(e.to_string()))
}

fn verify_password(password: &str, stored: &str) -> Result<()> {
    let parsed = PasswordHash::new(stored).map_err(|e| Error::PasswordHash(e.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| Error::InvalidCredentials)
}

/// Hash of a random password nobody knows, computed once
fn decoy_hash() -> Option<&'static str> {
    static DECOY: OnceLock<Option<String>> = OnceLock::new();
    DECOY
        .get_or_init(|| hash_password(&new_token()).ok())
        .as_deref()
}

/// 32 random bytes, URL-safe base64 without padding
fn new_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
