use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::models::{AccountSettings, PublishKind, PublishStatus, SnapshotKind};

/// Upsert payload for a connected account, produced by the OAuth callback.
/// Conflict key is `(user_id, google_account_name)`: reconnecting an existing
/// account re-activates it and replaces its credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountCreate {
    pub user_id: String,
    pub label: String,
    pub google_account_name: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub settings: AccountSettings,
}

/// Partial update for an account row. `None` fields are left untouched.
/// Token fields are only ever written by the token refresher and the OAuth
/// callback; `is_active: false` is the soft-delete path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountPatch {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
    pub last_sync: Option<DateTime<Utc>>,
    pub settings: Option<AccountSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationUpsert {
    pub account_id: i64,
    pub resource_name: String,
    pub title: Option<String>,
    pub payload: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotUpsert {
    pub resource_name: String,
    pub payload: String,
}

/// Batch replace of pulled data for one `(location, kind)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotBatch {
    pub location_id: i64,
    pub kind: SnapshotKind,
    pub items: Vec<SnapshotUpsert>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishableCreate {
    pub account_id: i64,
    pub location_id: i64,
    pub kind: PublishKind,
    pub body: String,
    pub target_resource: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishablePatch {
    pub status: Option<PublishStatus>,
    pub provider_resource_id: Option<String>,
    pub error_message: Option<String>,
}
