use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::warn;

/// Per-account sync cadence. `Manual` accounts are only ever user-triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncCadence {
    Manual,
    Hourly,
    #[default]
    Daily,
    TwiceDaily,
    Weekly,
}

/// Typed per-account settings stored as a JSON blob in `accounts.settings`.
///
/// Recognized fields only; anything missing falls back to the documented
/// defaults, and a malformed blob degrades to `Self::default()` rather than
/// failing the read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AccountSettings {
    pub sync_cadence: SyncCadence,
    pub auto_reply: bool,
    pub notify_on_review: bool,
    pub notify_on_question: bool,
}

impl AccountSettings {
    pub fn parse(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|e| {
            warn!(error = %e, "malformed account settings blob, using defaults");
            Self::default()
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbAccount {
    pub id: i64,
    pub user_id: String,
    pub label: String,
    /// Provider-side resource name, e.g. `accounts/1234567890`.
    pub google_account_name: String,
    pub is_active: bool,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub settings: String,
    pub last_sync: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbAccount {
    pub fn settings(&self) -> AccountSettings {
        AccountSettings::parse(&self.settings)
    }

    /// The stored access token is only trustworthy while `token_expires_at`
    /// is strictly in the future.
    pub fn token_is_fresh(&self, now: DateTime<Utc>) -> bool {
        match (&self.access_token, self.token_expires_at) {
            (Some(token), Some(expiry)) => !token.is_empty() && expiry > now,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbLocation {
    pub id: i64,
    pub account_id: i64,
    pub resource_name: String,
    pub title: Option<String>,
    pub payload: String,
    pub updated_at: DateTime<Utc>,
}

/// Kinds of pulled provider data stored in `remote_snapshots`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SnapshotKind {
    Review,
    Post,
    Media,
    Metric,
    Question,
}

impl SnapshotKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotKind::Review => "review",
            SnapshotKind::Post => "post",
            SnapshotKind::Media => "media",
            SnapshotKind::Metric => "metric",
            SnapshotKind::Question => "question",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PublishKind {
    Post,
    ReviewReply,
    QuestionAnswer,
}

impl PublishKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PublishKind::Post => "post",
            PublishKind::ReviewReply => "review_reply",
            PublishKind::QuestionAnswer => "question_answer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PublishStatus {
    Draft,
    Pending,
    Published,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbPublishable {
    pub id: i64,
    pub account_id: i64,
    pub location_id: i64,
    pub kind: PublishKind,
    pub status: PublishStatus,
    /// JSON request payload authored locally (post body, reply text, answer).
    pub body: String,
    /// Parent resource path the mutation targets, relative to its surface,
    /// e.g. `accounts/123/locations/456/localPosts`.
    pub target_resource: String,
    pub provider_resource_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbActionLogEntry {
    pub id: i64,
    pub action: String,
    pub status: String,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults_for_empty_blob() {
        let s = AccountSettings::parse("{}");
        assert_eq!(s.sync_cadence, SyncCadence::Daily);
        assert!(!s.auto_reply);
    }

    #[test]
    fn settings_recognized_fields_override_defaults() {
        let s = AccountSettings::parse(r#"{"sync_cadence":"hourly","auto_reply":true}"#);
        assert_eq!(s.sync_cadence, SyncCadence::Hourly);
        assert!(s.auto_reply);
        assert!(!s.notify_on_review);
    }

    #[test]
    fn settings_malformed_blob_degrades_to_defaults() {
        let s = AccountSettings::parse("not json at all");
        assert_eq!(s, AccountSettings::default());
    }

    #[test]
    fn unknown_settings_fields_are_ignored() {
        let s = AccountSettings::parse(r#"{"sync_cadence":"weekly","legacy_flag":42}"#);
        assert_eq!(s.sync_cadence, SyncCadence::Weekly);
    }
}
