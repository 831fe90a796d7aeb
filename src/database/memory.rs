use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::store::{unknown_crns_error, Store};
use crate::{
    models::{Class, Subscription, User, UserClass, WatchRow},
    utils::AppError,
};

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, User>,
    classes: BTreeMap<i32, Class>,
    user_classes: BTreeMap<(String, i32), UserClass>,
}

/// Process-local store selected with `DATABASE_URL=memory://`.
///
/// Every operation runs under one lock, so batch writes are atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>, AppError> {
        self.state
            .read()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>, AppError> {
        self.state
            .write()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        self.read().map(|_| ())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.read()?.users.get(email).cloned())
    }

    async fn find_user_by_reset_token(&self, token: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.reset_token.as_deref() == Some(token))
            .cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        let mut state = self.write()?;
        if state.users.contains_key(&user.email) {
            return Err(AppError::Conflict("Email already exists.".to_string()));
        }
        state.users.insert(user.email.clone(), user.clone());
        Ok(())
    }

    async fn refresh_unverified(
        &self,
        email: &str,
        password_hash: &str,
        verification_token: &str,
    ) -> Result<(), AppError> {
        let mut state = self.write()?;
        match state.users.get_mut(email).filter(|u| !u.verified) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.verification_token = Some(verification_token.to_string());
                Ok(())
            }
            None => Err(AppError::Conflict("Email already exists.".to_string())),
        }
    }

    async fn verify_by_token(&self, token: &str) -> Result<Option<String>, AppError> {
        let mut state = self.write()?;
        let user = state
            .users
            .values_mut()
            .find(|u| u.verification_token.as_deref() == Some(token));

        Ok(user.map(|user| {
            user.verified = true;
            user.verification_token = None;
            user.email.clone()
        }))
    }

    async fn set_reset_token(
        &self,
        email: &str,
        token: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut state = self.write()?;
        let user = state
            .users
            .get_mut(email)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", email)))?;

        user.reset_token = Some(token.to_string());
        user.reset_token_expires = Some(expires);
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, AppError> {
        let mut state = self.write()?;
        let user = state
            .users
            .values_mut()
            .find(|u| u.reset_token_valid(token, now));

        Ok(user.map(|user| {
            user.password_hash = password_hash.to_string();
            user.clear_reset_token();
            user.email.clone()
        }))
    }

    async fn replace_user_classes(&self, email: &str, rows: &[UserClass]) -> Result<(), AppError> {
        let mut state = self.write()?;

        state.user_classes.retain(|(user_email, _), _| user_email != email);

        for row in rows {
            state
                .classes
                .entry(row.crn)
                .or_insert_with(|| Class::new(row.crn));
            state
                .user_classes
                .insert((email.to_string(), row.crn), row.clone());
        }

        Ok(())
    }

    async fn user_classes(&self, email: &str) -> Result<Vec<Subscription>, AppError> {
        let state = self.read()?;

        Ok(state
            .user_classes
            .values()
            .filter(|uc| uc.user_email == email)
            .map(|uc| Subscription {
                crn: uc.crn,
                notes: uc.notes.clone(),
                notifications: uc.notifications,
                status: state.classes.get(&uc.crn).map(|c| c.status).unwrap_or_default(),
            })
            .collect())
    }

    async fn watch_rows(&self) -> Result<Vec<WatchRow>, AppError> {
        let state = self.read()?;

        let rows = state
            .user_classes
            .values()
            .filter(|uc| uc.notifications)
            .filter_map(|uc| {
                let user = state.users.get(&uc.user_email).filter(|u| u.verified)?;
                let class = state.classes.get(&uc.crn)?;
                Some(WatchRow {
                    email: user.email.clone(),
                    last_notified_at: user.last_notified_at,
                    crn: class.crn,
                    note: uc.notes.clone(),
                    status: class.status,
                    subscribed_at: uc.created_at,
                })
            })
            .collect();

        Ok(rows)
    }

    async fn mark_notified(&self, emails: &[String], at: DateTime<Utc>) -> Result<(), AppError> {
        let mut state = self.write()?;
        for email in emails {
            if let Some(user) = state.users.get_mut(email) {
                user.last_notified_at = Some(at);
            }
        }
        Ok(())
    }

    async fn update_class_statuses(&self, statuses: &BTreeMap<i32, i32>) -> Result<usize, AppError> {
        let mut state = self.write()?;

        let missing: Vec<i32> = statuses
            .keys()
            .filter(|crn| !state.classes.contains_key(*crn))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(unknown_crns_error(&missing));
        }

        for (crn, status) in statuses {
            if let Some(class) = state.classes.get_mut(crn) {
                class.status = *status;
            }
        }

        Ok(statuses.len())
    }
}
