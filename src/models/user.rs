use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account record. `email` is the primary identifier.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub verified: bool,
    pub verification_token: Option<String>,
    pub reset_token: Option<String>,
    pub reset_token_expires: Option<DateTime<Utc>>,
    /// Last time the bot was handed this user's course list.
    pub last_notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new_unverified(
        email: &str,
        password_hash: String,
        verification_token: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            email: email.to_string(),
            password_hash,
            verified: false,
            verification_token: Some(verification_token),
            reset_token: None,
            reset_token_expires: None,
            last_notified_at: None,
            created_at: now,
        }
    }

    /// A reset token is usable only while its expiry lies strictly in the future.
    pub fn reset_token_valid(&self, token: &str, now: DateTime<Utc>) -> bool {
        match (&self.reset_token, self.reset_token_expires) {
            (Some(stored), Some(expires)) => stored == token && expires > now,
            _ => false,
        }
    }

    pub fn clear_reset_token(&mut self) {
        self.reset_token = None;
        self.reset_token_expires = None;
    }
}
