//! Shared fixtures for unit and HTTP tests: an in-memory store, a mailer
//! that records instead of sending and predictable tokens.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::{
    config::AppConfig,
    database::{MemoryStore, Store},
    models::User,
    services::email_service::{Mailer, OutboundEmail},
    state::AppState,
    utils::{AppError, TokenGenerator},
};

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutboundEmail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), AppError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// Yields "token-1", "token-2", ...
#[derive(Default)]
pub struct SequentialTokens {
    next: AtomicU64,
}

impl TokenGenerator for SequentialTokens {
    fn generate(&self) -> String {
        format!("token-{}", self.next.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        api_base_url: "http://api.test".to_string(),
        webpage_base_url: "http://web.test".to_string(),
        jwt_secret: "test-secret".to_string(),
        bcrypt_cost: 4,
        ..AppConfig::default()
    }
}

pub struct TestContext {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
}

pub fn context() -> TestContext {
    context_with(test_config())
}

pub fn context_with(config: AppConfig) -> TestContext {
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(RecordingMailer::default());

    let state = AppState {
        store: store.clone(),
        mailer: mailer.clone(),
        tokens: Arc::new(SequentialTokens::default()),
        config: Arc::new(config),
    };

    TestContext {
        state,
        store,
        mailer,
    }
}

impl TestContext {
    /// Inserts a user directly, skipping the email round trip.
    pub async fn insert_user(&self, email: &str, password: &str, verified: bool) -> User {
        let hash = bcrypt::hash(password, self.state.config.bcrypt_cost).unwrap();
        let mut user = User::new_unverified(email, hash, format!("verify-{}", email), Utc::now());
        user.verified = verified;
        self.store.insert_user(&user).await.unwrap();
        user
    }

    pub async fn user(&self, email: &str) -> User {
        self.store.find_user_by_email(email).await.unwrap().unwrap()
    }
}
