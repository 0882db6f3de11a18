//! User account model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;

/// A registered account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(username: String, password_hash: String) -> Self {
        Self {
            id: UserId::new(),
            username,
            password_hash,
            created_at: Utc::now(),
            last_login: None,
        }
    }
}

/// Active session for a logged-in user, addressed by an opaque token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(token: String, user_id: UserId, duration_hours: i64) -> Self {
        let now = Utc::now();
        let expires_at = chrono::Duration::try_hours(duration_hours)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .unwrap_or(if duration_hours < 0 {
                DateTime::<Utc>::MIN_UTC
            } else {
                DateTime::<Utc>::MAX_UTC
            });
        Self {
            token,
            user_id,
            created_at: now,
            expires_at,
        }
    }

    pub fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

/// Public view of an account; never carries the password hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
        }
    }
}
