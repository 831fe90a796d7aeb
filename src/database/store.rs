use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::{
    models::{Subscription, User, UserClass, WatchRow},
    utils::AppError,
};

/// Persistence seam shared by the credential and subscription stores.
///
/// Implementations must apply `replace_user_classes` and
/// `update_class_statuses` as single units of work: either every write of
/// the call is visible afterwards or none is. User updates write only the
/// fields they name, so concurrent updates to other fields survive.
#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap round trip used by the health endpoint.
    async fn ping(&self) -> Result<(), AppError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_user_by_reset_token(&self, token: &str) -> Result<Option<User>, AppError>;

    /// Fails with `AppError::Conflict` if the email is taken.
    async fn insert_user(&self, user: &User) -> Result<(), AppError>;

    /// Sets a new password hash and verification token on an account that
    /// is still unverified. Fails with `AppError::Conflict` once it is verified.
    async fn refresh_unverified(
        &self,
        email: &str,
        password_hash: &str,
        verification_token: &str,
    ) -> Result<(), AppError>;

    /// Marks the owner of `token` verified and clears the token. Returns the
    /// owner's email, or `None` when no account holds the token.
    async fn verify_by_token(&self, token: &str) -> Result<Option<String>, AppError>;

    async fn set_reset_token(
        &self,
        email: &str,
        token: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Replaces the password of the account whose reset token is `token` and
    /// still valid at `now`, clearing token and expiry. Returns the email.
    async fn consume_reset_token(
        &self,
        token: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, AppError>;

    /// Drops every subscription of `email` and writes `rows` in their place,
    /// creating missing classes with the unknown status.
    async fn replace_user_classes(&self, email: &str, rows: &[UserClass]) -> Result<(), AppError>;

    /// Subscriptions of one user ordered by CRN.
    async fn user_classes(&self, email: &str) -> Result<Vec<Subscription>, AppError>;

    /// Verified users × subscriptions with notifications enabled, ordered by
    /// email then CRN.
    async fn watch_rows(&self) -> Result<Vec<WatchRow>, AppError>;

    async fn mark_notified(&self, emails: &[String], at: DateTime<Utc>) -> Result<(), AppError>;

    /// Returns the number of classes updated. Unknown CRNs fail the whole
    /// batch with `AppError::NotFound` and nothing is written.
    async fn update_class_statuses(&self, statuses: &BTreeMap<i32, i32>) -> Result<usize, AppError>;
}

pub(crate) fn unknown_crns_error(missing: &[i32]) -> AppError {
    let list = missing
        .iter()
        .map(|crn| crn.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    AppError::NotFound(format!("Unknown CRNs: {}", list))
}
