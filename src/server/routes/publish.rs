use crate::db::{PublishKind, PublishableCreate};
use crate::error::SignpostError;
use crate::publish::PublishOutcome;
use crate::server::guards::auth::UserIdentity;
use crate::server::router::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
pub struct DraftRequest {
    pub account_id: i64,
    pub location_id: i64,
    pub kind: PublishKind,
    pub body: Value,
    pub target_resource: String,
}

/// POST /publishables
///
/// Stores a draft for later publishing. The ownership check on the target
/// account happens here; the draft itself never touches the network.
pub async fn create_draft(
    user: UserIdentity,
    State(state): State<AppState>,
    Json(req): Json<DraftRequest>,
) -> Result<(StatusCode, Json<Value>), SignpostError> {
    state.db.get_owned_account(req.account_id, &user.0).await?;

    let id = state
        .db
        .create_publishable(PublishableCreate {
            account_id: req.account_id,
            location_id: req.location_id,
            kind: req.kind,
            body: req.body.to_string(),
            target_resource: req.target_resource,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

/// POST /publishables/{id}/publish
///
/// Pushes one draft to Google. A draft already published (or mid-flight)
/// comes back 409 without a network call.
pub async fn publish_entity(
    user: UserIdentity,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PublishOutcome>, SignpostError> {
    let outcome = state.publisher.publish(&user.0, id).await?;
    Ok(Json(outcome))
}
