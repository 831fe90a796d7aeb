use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription of a user to a class, keyed by (user_email, crn).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserClass {
    pub user_email: String,
    pub crn: i32,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "default_true")]
    pub notifications: bool,
    pub created_at: DateTime<Utc>,
}

/// One row of an `update_classes` request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, utoipa::ToSchema)]
pub struct ClassRow {
    #[serde(deserialize_with = "deserialize_crn")]
    #[schema(value_type = i32, example = 20512)]
    pub crn: i32,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "default_true")]
    pub notifications: bool,
}

/// A subscription joined with the current status of its class.
#[derive(Debug, Serialize, Clone, PartialEq, utoipa::ToSchema)]
pub struct Subscription {
    pub crn: i32,
    pub notes: String,
    pub notifications: bool,
    pub status: i32,
}

/// Flat row of the bot watch query: verified user × enabled subscription × class.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchRow {
    pub email: String,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub crn: i32,
    pub note: String,
    pub status: i32,
    pub subscribed_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

/// Front-ends send CRNs both as numbers and as strings ("20512").
fn deserialize_crn<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum CrnRepr {
        Number(i64),
        Text(String),
    }

    let value = match CrnRepr::deserialize(deserializer)? {
        CrnRepr::Number(n) => n,
        CrnRepr::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom(format!("CRN '{}' is not a number", s)))?,
    };

    i32::try_from(value).map_err(|_| serde::de::Error::custom(format!("CRN {} is out of range", value)))
}
