use crate::error::SignpostError;
use crate::server::guards::auth::{RequireCronAuth, UserIdentity};
use crate::server::router::AppState;
use crate::sync::SyncType;
use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;

/// POST /internal/cron/sync
///
/// External scheduler trigger. Selects due accounts against wall-clock now
/// and syncs them; the response summarizes per-account outcomes so the
/// operator can see reconnect-required accounts without trawling logs.
pub async fn cron_sync(
    _auth: RequireCronAuth,
    State(state): State<AppState>,
) -> Result<Json<crate::sync::PassSummary>, SignpostError> {
    let summary = state.engine.run_scheduler_pass(Utc::now()).await?;
    Ok(Json(summary))
}

/// POST /accounts/{id}/sync
///
/// User-initiated sync of one owned account. Bypasses the cadence check
/// entirely; "Sync now" means now.
pub async fn manual_sync(
    user: UserIdentity,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<crate::sync::SyncReport>, SignpostError> {
    state.db.get_owned_account(id, &user.0).await?;
    let report = state.engine.sync_account(id, SyncType::Full).await?;
    Ok(Json(report))
}
