// ==================== SUBSCRIPTIONS ====================
// User course lists and the bot-facing watch/status queries.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
    models::{ClassRow, Subscription, UserClass},
    state::AppState,
    utils::AppError,
};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateClassesRequest {
    #[serde(rename = "accountName")]
    pub account_name: String,
    #[serde(default)]
    pub rows: Vec<ClassRow>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UpdateClassesResponse {
    pub success: bool,
    pub message: String,
    pub count: usize,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UserClassesResponse {
    pub success: bool,
    pub email: String,
    pub classes: Vec<Subscription>,
}

#[derive(Debug, Serialize, Clone, PartialEq, utoipa::ToSchema)]
pub struct WatchedCourse {
    pub crn: i32,
    pub note: String,
    pub status: i32,
}

/// Bot view of one user.
#[derive(Debug, Serialize, Clone, PartialEq, utoipa::ToSchema)]
pub struct WatchedUser {
    pub first_time: bool,
    pub courses: Vec<WatchedCourse>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StatusUpdateResponse {
    pub success: bool,
    pub updated: usize,
}

/// A subscription is new to the bot if it was created after the user was last notified.
fn is_first_time(last_notified_at: Option<DateTime<Utc>>, subscribed_at: DateTime<Utc>) -> bool {
    last_notified_at.map_or(true, |notified| subscribed_at > notified)
}

/// Stamp recorded for a watch-list read that started at `read_at`. Stored
/// dates keep milliseconds only, so the stamp sits one millisecond below the
/// read: a subscription written during the read's millisecond still compares
/// as newer and is announced again on the next poll.
fn notification_stamp(read_at: DateTime<Utc>) -> DateTime<Utc> {
    read_at.trunc_subsecs(3) - Duration::milliseconds(1)
}

async fn require_user(state: &AppState, email: &str) -> Result<(), AppError> {
    match state.store.find_user_by_email(email).await? {
        Some(_) => Ok(()),
        None => Err(AppError::NotFound(format!("User {} not found.", email))),
    }
}

/// Replaces the whole course list of `accountName` with `rows`.
///
/// Duplicate CRNs collapse to the last row given. Returns the number of
/// subscriptions stored.
pub async fn update_classes(state: &AppState, request: &UpdateClassesRequest) -> Result<usize, AppError> {
    let email = request.account_name.trim();
    if email.is_empty() {
        return Err(AppError::Validation("accountName is required.".to_string()));
    }

    if let Some(row) = request.rows.iter().find(|row| row.crn <= 0) {
        return Err(AppError::Validation(format!("Invalid CRN: {}", row.crn)));
    }

    require_user(state, email).await?;

    let now = Utc::now();
    let by_crn: BTreeMap<i32, &ClassRow> = request.rows.iter().map(|row| (row.crn, row)).collect();
    let rows: Vec<UserClass> = by_crn
        .into_values()
        .map(|row| UserClass {
            user_email: email.to_string(),
            crn: row.crn,
            notes: row.notes.clone().unwrap_or_default(),
            notifications: row.notifications,
            created_at: now,
        })
        .collect();

    state.store.replace_user_classes(email, &rows).await?;

    log::info!("📚 {} now follows {} classes", email, rows.len());
    Ok(rows.len())
}

pub async fn list_user_classes(state: &AppState, email: &str) -> Result<Vec<Subscription>, AppError> {
    let email = email.trim();
    require_user(state, email).await?;
    state.store.user_classes(email).await
}

/// Builds the bot's watch list, grouped by email, then stamps every user in
/// it as notified. Users outside the list keep their state.
pub async fn get_user_classes(state: &AppState) -> Result<BTreeMap<String, WatchedUser>, AppError> {
    // Taken before the read: a subscription written meanwhile is announced again
    // rather than missed.
    let notified_at = notification_stamp(Utc::now());
    let rows = state.store.watch_rows().await?;

    let mut watched: BTreeMap<String, WatchedUser> = BTreeMap::new();
    for row in rows {
        let entry = watched.entry(row.email).or_insert_with(|| WatchedUser {
            first_time: false,
            courses: Vec::new(),
        });
        entry.first_time |= is_first_time(row.last_notified_at, row.subscribed_at);
        entry.courses.push(WatchedCourse {
            crn: row.crn,
            note: row.note,
            status: row.status,
        });
    }

    let emails: Vec<String> = watched.keys().cloned().collect();
    state.store.mark_notified(&emails, notified_at).await?;

    log::info!("🤖 Bot watch list: {} users", watched.len());
    Ok(watched)
}

/// Applies a batch of CRN → status reports. Unknown CRNs reject the batch.
pub async fn update_class_statuses(
    state: &AppState,
    statuses: &BTreeMap<i32, i32>,
) -> Result<usize, AppError> {
    let updated = state.store.update_class_statuses(statuses).await?;
    log::info!("🤖 Updated status of {} classes", updated);
    Ok(updated)
}
