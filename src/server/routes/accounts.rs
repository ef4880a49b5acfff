use crate::db::{AccountPatch, AccountSettings, DbAccount, DbActionLogEntry};
use crate::error::SignpostError;
use crate::server::guards::auth::{RequireCronAuth, UserIdentity};
use crate::server::router::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

/// Token-free projection of an account row for the dashboard. Credentials
/// never leave the process.
#[derive(Debug, Serialize)]
pub struct AccountView {
    pub id: i64,
    pub label: String,
    pub google_account_name: String,
    pub is_active: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub settings: AccountSettings,
}

impl From<&DbAccount> for AccountView {
    fn from(a: &DbAccount) -> Self {
        Self {
            id: a.id,
            label: a.label.clone(),
            google_account_name: a.google_account_name.clone(),
            is_active: a.is_active,
            last_sync: a.last_sync,
            settings: a.settings(),
        }
    }
}

/// GET /accounts
pub async fn list_accounts(
    user: UserIdentity,
    State(state): State<AppState>,
) -> Result<Json<Vec<AccountView>>, SignpostError> {
    let accounts = state.db.list_accounts_for_user(&user.0).await?;
    Ok(Json(accounts.iter().map(AccountView::from).collect()))
}

/// POST /accounts/{id}/settings
///
/// Replaces the whole settings blob. Partial edits are the dashboard's job;
/// the server stores one validated value.
pub async fn update_settings(
    user: UserIdentity,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(settings): Json<AccountSettings>,
) -> Result<Json<AccountView>, SignpostError> {
    state.db.get_owned_account(id, &user.0).await?;
    state
        .db
        .patch_account(
            id,
            AccountPatch {
                settings: Some(settings),
                ..AccountPatch::default()
            },
        )
        .await?;

    let account = state.db.get_account(id).await?;
    Ok(Json(AccountView::from(&account)))
}

/// POST /accounts/{id}/disconnect
///
/// Soft delete: deactivates the account so the scheduler and resolver skip
/// it. Pulled data stays around so the dashboard history survives a
/// reconnect.
pub async fn disconnect(
    user: UserIdentity,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, SignpostError> {
    state.db.get_owned_account(id, &user.0).await?;
    state
        .db
        .patch_account(
            id,
            AccountPatch {
                is_active: Some(false),
                ..AccountPatch::default()
            },
        )
        .await?;

    state
        .db
        .log_action("account_disconnect", "success", json!({ "account_id": id }));
    info!(account_id = id, "account disconnected");
    Ok(StatusCode::NO_CONTENT)
}

const ACTION_LOG_PAGE: i64 = 100;

/// GET /internal/actions
///
/// Most recent action-log entries, newest first. Operator-facing, behind the
/// shared-secret guard.
pub async fn recent_actions(
    _auth: RequireCronAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<DbActionLogEntry>>, SignpostError> {
    let entries = state.db.list_action_log(ACTION_LOG_PAGE).await?;
    Ok(Json(entries))
}
