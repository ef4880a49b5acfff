//! Publish pipeline: pushes one locally-authored mutation (post, review
//! reply, question answer) to Google with token-refresh-aware failure
//! classification. Exactly one external call per invocation; retries are a
//! caller policy, never internal.

use crate::db::{DbHandle, DbPublishable, PublishKind, PublishStatus, PublishablePatch};
use crate::error::SignpostError;
use crate::gateway::{GbpClient, Surface};
use crate::oauth::TokenResolver;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub entity_id: i64,
    pub status: PublishStatus,
    pub provider_resource_id: Option<String>,
}

pub struct PublishPipeline {
    db: DbHandle,
    resolver: Arc<TokenResolver>,
    gateway: Arc<GbpClient>,
}

impl PublishPipeline {
    pub fn new(db: DbHandle, resolver: Arc<TokenResolver>, gateway: Arc<GbpClient>) -> Self {
        Self {
            db,
            resolver,
            gateway,
        }
    }

    /// Publishes `entity_id` on behalf of `user_id`.
    ///
    /// The ownership check runs before any token resolution. An entity
    /// already `published` (or with a publish in flight) is rejected without
    /// touching the network: re-publishing a finished entity is a caller
    /// bug, and double-posting to Google is worse than erroring.
    pub async fn publish(
        &self,
        user_id: &str,
        entity_id: i64,
    ) -> Result<PublishOutcome, SignpostError> {
        let entity = self.db.get_publishable(entity_id).await?;
        let account = self
            .db
            .get_owned_account(entity.account_id, user_id)
            .await?;

        if !account.is_active {
            return Err(SignpostError::Forbidden(format!(
                "account {} is disconnected",
                account.id
            )));
        }

        match entity.status {
            PublishStatus::Published => {
                return Err(SignpostError::Conflict(format!(
                    "publishable {entity_id} is already published"
                )));
            }
            PublishStatus::Pending => {
                return Err(SignpostError::Conflict(format!(
                    "publishable {entity_id} has a publish in flight"
                )));
            }
            PublishStatus::Draft | PublishStatus::Failed => {}
        }

        // Token-resolution failure is terminal for this entity: record it
        // and surface the reconnect remedy instead of retrying.
        let token = match self.resolver.valid_access_token(account.id).await {
            Ok(token) => token,
            Err(e) => {
                let message = if e.needs_reconnect() {
                    "Reconnect your Google account, then resubmit.".to_string()
                } else {
                    e.to_string()
                };
                self.mark_failed(&entity, &message).await;
                return Err(e);
            }
        };

        let body: Value = serde_json::from_str(&entity.body)?;

        // Pending only for the window of the actual external call.
        self.db
            .patch_publishable(
                entity.id,
                PublishablePatch {
                    status: Some(PublishStatus::Pending),
                    ..Default::default()
                },
            )
            .await?;

        let result = self.send_to_provider(&entity, &token, &body).await;

        // The local row is the system of record for "did Google receive
        // this": it flips only after the external call has resolved.
        match result {
            Ok(resp) => {
                let provider_id = resp
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string);

                self.db
                    .patch_publishable(
                        entity.id,
                        PublishablePatch {
                            status: Some(PublishStatus::Published),
                            provider_resource_id: provider_id.clone(),
                            ..Default::default()
                        },
                    )
                    .await?;

                self.db.log_action(
                    "publish",
                    "success",
                    json!({
                        "entity_id": entity.id,
                        "kind": entity.kind,
                        "provider_resource_id": provider_id,
                    }),
                );
                info!(entity_id = entity.id, kind = ?entity.kind, "publish succeeded");

                Ok(PublishOutcome {
                    entity_id: entity.id,
                    status: PublishStatus::Published,
                    provider_resource_id: provider_id,
                })
            }
            Err(e) => {
                // Preserve the raw provider error text for support
                // diagnosis; the response surface normalizes the message.
                self.mark_failed(&entity, &e.to_string()).await;
                warn!(entity_id = entity.id, error = %e, "publish failed");
                Err(e)
            }
        }
    }

    async fn send_to_provider(
        &self,
        entity: &DbPublishable,
        token: &str,
        body: &Value,
    ) -> Result<Value, SignpostError> {
        match entity.kind {
            PublishKind::Post => {
                self.gateway
                    .post_json(Surface::V4, &entity.target_resource, token, body)
                    .await
            }
            // The v4 reply endpoint is an upsert of the single reply slot.
            PublishKind::ReviewReply => {
                self.gateway
                    .put_json(Surface::V4, &entity.target_resource, token, body)
                    .await
            }
            PublishKind::QuestionAnswer => {
                self.gateway
                    .post_json(Surface::Qna, &entity.target_resource, token, body)
                    .await
            }
        }
    }

    async fn mark_failed(&self, entity: &DbPublishable, message: &str) {
        if let Err(e) = self
            .db
            .patch_publishable(
                entity.id,
                PublishablePatch {
                    status: Some(PublishStatus::Failed),
                    error_message: Some(message.to_string()),
                    ..Default::default()
                },
            )
            .await
        {
            warn!(entity_id = entity.id, error = %e, "failed to record publish failure");
        }

        self.db.log_action(
            "publish",
            "error",
            json!({ "entity_id": entity.id, "kind": entity.kind, "error": message }),
        );
    }
}
