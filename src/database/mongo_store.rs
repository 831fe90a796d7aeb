use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, DateTime as BsonDateTime, Document};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::store::{unknown_crns_error, Store};
use super::MongoDB;
use crate::{
    models::{Subscription, User, UserClass, WatchRow, UNKNOWN_STATUS},
    utils::AppError,
};

const USERS: &str = "users";
const CLASSES: &str = "classes";
const USER_CLASSES: &str = "user_classes";

// ==================== DOCUMENTS ====================

/// Shape of a document in "users". Absent tokens are left out so the sparse
/// unique indexes ignore them.
#[derive(Debug, Serialize, Deserialize)]
struct UserDocument {
    email: String,
    password_hash: String,
    #[serde(default)]
    verified: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    verification_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    reset_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    reset_token_expires: Option<BsonDateTime>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    last_notified_at: Option<BsonDateTime>,
    created_at: BsonDateTime,
}

#[derive(Debug, Serialize, Deserialize)]
struct UserClassDocument {
    user_email: String,
    crn: i32,
    #[serde(default)]
    notes: String,
    notifications: bool,
    created_at: BsonDateTime,
}

/// Output of the subscription aggregations.
#[derive(Debug, Deserialize)]
struct SubscriptionDocument {
    crn: i32,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    notifications: bool,
    #[serde(default)]
    status: i32,
}

#[derive(Debug, Deserialize)]
struct WatchRowDocument {
    email: String,
    #[serde(default)]
    last_notified_at: Option<BsonDateTime>,
    crn: i32,
    #[serde(default)]
    note: String,
    #[serde(default)]
    status: i32,
    subscribed_at: BsonDateTime,
}

fn to_bson_date(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

fn from_bson_date(dt: BsonDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or_default()
}

impl From<&User> for UserDocument {
    fn from(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            verified: user.verified,
            verification_token: user.verification_token.clone(),
            reset_token: user.reset_token.clone(),
            reset_token_expires: user.reset_token_expires.map(to_bson_date),
            last_notified_at: user.last_notified_at.map(to_bson_date),
            created_at: to_bson_date(user.created_at),
        }
    }
}

impl From<UserDocument> for User {
    fn from(doc: UserDocument) -> Self {
        Self {
            email: doc.email,
            password_hash: doc.password_hash,
            verified: doc.verified,
            verification_token: doc.verification_token,
            reset_token: doc.reset_token,
            reset_token_expires: doc.reset_token_expires.map(from_bson_date),
            last_notified_at: doc.last_notified_at.map(from_bson_date),
            created_at: from_bson_date(doc.created_at),
        }
    }
}

impl From<&UserClass> for UserClassDocument {
    fn from(row: &UserClass) -> Self {
        Self {
            user_email: row.user_email.clone(),
            crn: row.crn,
            notes: row.notes.clone(),
            notifications: row.notifications,
            created_at: to_bson_date(row.created_at),
        }
    }
}

impl From<WatchRowDocument> for WatchRow {
    fn from(doc: WatchRowDocument) -> Self {
        Self {
            email: doc.email,
            last_notified_at: doc.last_notified_at.map(from_bson_date),
            crn: doc.crn,
            note: doc.note,
            status: doc.status,
            subscribed_at: from_bson_date(doc.subscribed_at),
        }
    }
}

// ==================== STORE ====================

impl MongoDB {
    async fn find_user(&self, filter: Document) -> Result<Option<User>, AppError> {
        let user = self
            .collection::<UserDocument>(USERS)
            .find_one(filter)
            .await?;
        Ok(user.map(User::from))
    }
}

#[async_trait]
impl Store for MongoDB {
    async fn ping(&self) -> Result<(), AppError> {
        self.database().run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.find_user(doc! { "email": email }).await
    }

    async fn find_user_by_reset_token(&self, token: &str) -> Result<Option<User>, AppError> {
        self.find_user(doc! { "reset_token": token }).await
    }

    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        self.collection::<UserDocument>(USERS)
            .insert_one(UserDocument::from(user))
            .await?;
        Ok(())
    }

    async fn refresh_unverified(
        &self,
        email: &str,
        password_hash: &str,
        verification_token: &str,
    ) -> Result<(), AppError> {
        let result = self
            .collection::<Document>(USERS)
            .update_one(
                doc! { "email": email, "verified": false },
                doc! { "$set": {
                    "password_hash": password_hash,
                    "verification_token": verification_token
                } },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(AppError::Conflict("Email already exists.".to_string()));
        }
        Ok(())
    }

    async fn verify_by_token(&self, token: &str) -> Result<Option<String>, AppError> {
        let previous = self
            .collection::<UserDocument>(USERS)
            .find_one_and_update(
                doc! { "verification_token": token },
                doc! {
                    "$set": { "verified": true },
                    "$unset": { "verification_token": "" }
                },
            )
            .await?;

        Ok(previous.map(|user| user.email))
    }

    async fn set_reset_token(
        &self,
        email: &str,
        token: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let result = self
            .collection::<Document>(USERS)
            .update_one(
                doc! { "email": email },
                doc! { "$set": {
                    "reset_token": token,
                    "reset_token_expires": to_bson_date(expires)
                } },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(AppError::NotFound(format!("User {} not found", email)));
        }
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, AppError> {
        let previous = self
            .collection::<UserDocument>(USERS)
            .find_one_and_update(
                doc! {
                    "reset_token": token,
                    "reset_token_expires": { "$gt": to_bson_date(now) }
                },
                doc! {
                    "$set": { "password_hash": password_hash },
                    "$unset": { "reset_token": "", "reset_token_expires": "" }
                },
            )
            .await?;

        Ok(previous.map(|user| user.email))
    }

    async fn replace_user_classes(&self, email: &str, rows: &[UserClass]) -> Result<(), AppError> {
        let classes = self.collection::<Document>(CLASSES);
        let user_classes = self.collection::<UserClassDocument>(USER_CLASSES);

        // Multi-document transactions need a replica set deployment
        let mut session = self.client().start_session().await?;
        session.start_transaction().await?;

        let deleted = user_classes
            .delete_many(doc! { "user_email": email })
            .session(&mut session)
            .await?;

        for row in rows {
            classes
                .update_one(
                    doc! { "crn": row.crn },
                    doc! { "$setOnInsert": { "status": UNKNOWN_STATUS } },
                )
                .upsert(true)
                .session(&mut session)
                .await?;
        }

        if !rows.is_empty() {
            let documents: Vec<UserClassDocument> = rows.iter().map(UserClassDocument::from).collect();
            user_classes
                .insert_many(documents)
                .session(&mut session)
                .await?;
        }

        session.commit_transaction().await?;

        log::debug!(
            "🔁 Replaced {} subscriptions with {} for {}",
            deleted.deleted_count,
            rows.len(),
            email
        );

        Ok(())
    }

    async fn user_classes(&self, email: &str) -> Result<Vec<Subscription>, AppError> {
        let pipeline = vec![
            doc! { "$match": { "user_email": email } },
            doc! { "$lookup": {
                "from": CLASSES,
                "localField": "crn",
                "foreignField": "crn",
                "as": "class"
            } },
            doc! { "$unwind": "$class" },
            doc! { "$sort": { "crn": 1 } },
            doc! { "$project": {
                "_id": 0,
                "crn": 1,
                "notes": 1,
                "notifications": 1,
                "status": "$class.status"
            } },
        ];

        let documents: Vec<Document> = self
            .collection::<Document>(USER_CLASSES)
            .aggregate(pipeline)
            .await?
            .try_collect()
            .await?;

        documents
            .into_iter()
            .map(|d| -> Result<Subscription, AppError> {
                let s: SubscriptionDocument = mongodb::bson::from_document(d)?;
                Ok(Subscription {
                    crn: s.crn,
                    notes: s.notes,
                    notifications: s.notifications,
                    status: s.status,
                })
            })
            .collect()
    }

    async fn watch_rows(&self) -> Result<Vec<WatchRow>, AppError> {
        let pipeline = vec![
            doc! { "$match": { "notifications": true } },
            doc! { "$lookup": {
                "from": USERS,
                "localField": "user_email",
                "foreignField": "email",
                "as": "user"
            } },
            doc! { "$unwind": "$user" },
            doc! { "$match": { "user.verified": true } },
            doc! { "$lookup": {
                "from": CLASSES,
                "localField": "crn",
                "foreignField": "crn",
                "as": "class"
            } },
            doc! { "$unwind": "$class" },
            doc! { "$sort": { "user_email": 1, "crn": 1 } },
            doc! { "$project": {
                "_id": 0,
                "email": "$user_email",
                "last_notified_at": "$user.last_notified_at",
                "crn": 1,
                "note": "$notes",
                "status": "$class.status",
                "subscribed_at": "$created_at"
            } },
        ];

        let documents: Vec<Document> = self
            .collection::<Document>(USER_CLASSES)
            .aggregate(pipeline)
            .await?
            .try_collect()
            .await?;

        documents
            .into_iter()
            .map(|d| -> Result<WatchRow, AppError> {
                let row: WatchRowDocument = mongodb::bson::from_document(d)?;
                Ok(WatchRow::from(row))
            })
            .collect()
    }

    async fn mark_notified(&self, emails: &[String], at: DateTime<Utc>) -> Result<(), AppError> {
        if emails.is_empty() {
            return Ok(());
        }

        self.collection::<Document>(USERS)
            .update_many(
                doc! { "email": { "$in": emails.to_vec() } },
                doc! { "$set": { "last_notified_at": to_bson_date(at) } },
            )
            .await?;
        Ok(())
    }

    async fn update_class_statuses(&self, statuses: &BTreeMap<i32, i32>) -> Result<usize, AppError> {
        if statuses.is_empty() {
            return Ok(0);
        }

        let classes = self.collection::<Document>(CLASSES);
        let crns: Vec<i32> = statuses.keys().copied().collect();

        let mut session = self.client().start_session().await?;
        session.start_transaction().await?;

        let known: Vec<i32> = classes
            .distinct("crn", doc! { "crn": { "$in": crns.clone() } })
            .session(&mut session)
            .await?
            .iter()
            .filter_map(|crn| crn.as_i32())
            .collect();

        let missing: Vec<i32> = crns.into_iter().filter(|crn| !known.contains(crn)).collect();
        if !missing.is_empty() {
            session.abort_transaction().await?;
            return Err(unknown_crns_error(&missing));
        }

        for (crn, status) in statuses {
            classes
                .update_one(doc! { "crn": *crn }, doc! { "$set": { "status": *status } })
                .session(&mut session)
                .await?;
        }

        session.commit_transaction().await?;

        Ok(statuses.len())
    }
}
