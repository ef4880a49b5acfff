use crate::config::SyncConfig;
use crate::db::{
    DbHandle, LocationUpsert, SnapshotBatch, SnapshotKind, SnapshotUpsert,
};
use crate::error::SignpostError;
use crate::gateway::{GbpClient, Surface};
use crate::oauth::TokenResolver;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Serialize;
use serde_json::{Value, json};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{info, warn};

/// The unit of work per scheduler tick. Created transiently by the scheduler
/// (or a manual trigger), consumed by one `sync_account` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Full,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SyncFailure {
    pub entity: String,
    pub error: String,
}

/// Per-entity outcome of one account sync. Partial failure is the normal
/// case: a reviews failure never aborts the locations pull that already
/// succeeded.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SyncReport {
    pub account_id: i64,
    pub locations: usize,
    pub reviews: usize,
    pub posts: usize,
    pub media: usize,
    pub metrics: usize,
    pub questions: usize,
    pub failures: Vec<SyncFailure>,
    pub last_sync_advanced: bool,
}

impl SyncReport {
    pub fn status(&self) -> &'static str {
        if self.failures.is_empty() {
            "success"
        } else {
            "partial"
        }
    }
}

/// Runs multi-entity pulls for one account against the GBP surfaces.
///
/// One valid access token is resolved per invocation and shared across all
/// sub-fetches; outbound calls share a process-wide rate limiter since
/// Google's quotas are per OAuth client, not per account.
pub struct SyncEngine {
    pub(crate) db: DbHandle,
    pub(crate) resolver: Arc<TokenResolver>,
    gateway: Arc<GbpClient>,
    limiter: Arc<DefaultDirectRateLimiter>,
    pub(crate) sync_cfg: SyncConfig,
}

impl SyncEngine {
    pub fn new(
        db: DbHandle,
        resolver: Arc<TokenResolver>,
        gateway: Arc<GbpClient>,
        sync_cfg: SyncConfig,
    ) -> Self {
        let tps = u32::try_from(sync_cfg.api_tps.max(1)).unwrap_or(u32::MAX);
        let limiter = Arc::new(RateLimiter::direct(
            Quota::per_second(NonZeroU32::new(tps).expect("tps >= 1"))
                .allow_burst(NonZeroU32::new(tps.saturating_mul(2).max(1)).expect("burst >= 1")),
        ));

        Self {
            db,
            resolver,
            gateway,
            limiter,
            sync_cfg,
        }
    }

    /// Pulls locations, then per-location reviews/posts/media/metrics/
    /// questions for one account.
    ///
    /// Errors out only when no useful work could happen at all: token
    /// resolution failed, the account is inactive, or the primary
    /// (locations) pull failed. In the error case `last_sync` is left
    /// untouched so staleness-gated schedules keep retrying the account.
    pub async fn sync_account(
        &self,
        account_id: i64,
        sync_type: SyncType,
    ) -> Result<SyncReport, SignpostError> {
        let account = self.db.get_account(account_id).await?;
        if !account.is_active {
            return Err(SignpostError::Forbidden(format!(
                "account {account_id} is disconnected"
            )));
        }

        let result = self.run_pulls(account_id, &account.google_account_name).await;

        match &result {
            Ok(report) => {
                self.db.log_action(
                    "sync_account",
                    report.status(),
                    json!({ "sync_type": sync_type, "report": report }),
                );
            }
            Err(e) => {
                self.db.log_action(
                    "sync_account",
                    "error",
                    json!({
                        "sync_type": sync_type,
                        "account_id": account_id,
                        "error": e.to_string(),
                        "needs_reconnect": e.needs_reconnect(),
                    }),
                );
            }
        }

        result
    }

    async fn run_pulls(
        &self,
        account_id: i64,
        google_account_name: &str,
    ) -> Result<SyncReport, SignpostError> {
        // One token per invocation, shared by every sub-fetch below.
        let token = self.resolver.valid_access_token(account_id).await?;

        let mut report = SyncReport {
            account_id,
            ..Default::default()
        };

        // Primary entity. A total failure here aborts the job without
        // advancing last_sync.
        let locations = self
            .pull_locations(account_id, google_account_name, &token)
            .await?;
        report.locations = locations.len();

        for (location_id, location_name) in &locations {
            let (reviews, posts, media, metrics, questions) = futures::join!(
                self.pull_snapshot(
                    *location_id,
                    SnapshotKind::Review,
                    Surface::V4,
                    format!("{location_name}/reviews"),
                    "reviews",
                    &token,
                ),
                self.pull_snapshot(
                    *location_id,
                    SnapshotKind::Post,
                    Surface::V4,
                    format!("{location_name}/localPosts"),
                    "localPosts",
                    &token,
                ),
                self.pull_snapshot(
                    *location_id,
                    SnapshotKind::Media,
                    Surface::V4,
                    format!("{location_name}/media"),
                    "mediaItems",
                    &token,
                ),
                self.pull_metrics(*location_id, google_account_name, location_name, &token),
                self.pull_snapshot(
                    *location_id,
                    SnapshotKind::Question,
                    Surface::Qna,
                    format!("{location_name}/questions"),
                    "questions",
                    &token,
                ),
            );

            accumulate(&mut report.reviews, "reviews", reviews, &mut report.failures);
            accumulate(&mut report.posts, "posts", posts, &mut report.failures);
            accumulate(&mut report.media, "media", media, &mut report.failures);
            accumulate(&mut report.metrics, "metrics", metrics, &mut report.failures);
            accumulate(
                &mut report.questions,
                "questions",
                questions,
                &mut report.failures,
            );
        }

        // Locations succeeded, so the account made progress: advance
        // last_sync even when dependent pulls partially failed.
        self.db
            .patch_account(
                account_id,
                crate::db::AccountPatch {
                    last_sync: Some(chrono::Utc::now()),
                    ..Default::default()
                },
            )
            .await?;
        report.last_sync_advanced = true;

        if report.failures.is_empty() {
            info!(account_id, locations = report.locations, "account sync complete");
        } else {
            warn!(
                account_id,
                failures = report.failures.len(),
                "account sync completed with partial failures"
            );
        }
        Ok(report)
    }

    /// Lists locations from the Business Information surface and upserts them
    /// locally. Returns `(local id, provider resource name)` pairs.
    async fn pull_locations(
        &self,
        account_id: i64,
        google_account_name: &str,
        token: &str,
    ) -> Result<Vec<(i64, String)>, SignpostError> {
        let items = self
            .pull_collection(
                Surface::BusinessInformation,
                &format!("{google_account_name}/locations?readMask=name,title"),
                "locations",
                token,
            )
            .await?;

        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let Some(resource_name) = item.get("name").and_then(Value::as_str) else {
                continue;
            };
            let resource_name = resource_name.to_string();
            let title = item
                .get("title")
                .and_then(Value::as_str)
                .map(str::to_string);

            let id = self
                .db
                .upsert_location(LocationUpsert {
                    account_id,
                    resource_name: resource_name.clone(),
                    title,
                    payload: item.to_string(),
                })
                .await?;
            out.push((id, resource_name));
        }
        Ok(out)
    }

    async fn pull_snapshot(
        &self,
        location_id: i64,
        kind: SnapshotKind,
        surface: Surface,
        path: String,
        items_key: &str,
        token: &str,
    ) -> Result<usize, SignpostError> {
        let items = self.pull_collection(surface, &path, items_key, token).await?;
        self.store_snapshots(location_id, kind, items).await
    }

    /// Report insights is a read-shaped POST on the v4 surface; it is
    /// idempotent, but we still issue it once per location without retry to
    /// keep the gateway's single-shot-mutation rule uniform.
    async fn pull_metrics(
        &self,
        location_id: i64,
        google_account_name: &str,
        location_name: &str,
        token: &str,
    ) -> Result<usize, SignpostError> {
        self.limiter.until_ready().await;

        let body = json!({
            "locationNames": [location_name],
            "basicRequest": { "metricRequests": [{ "metric": "ALL" }] },
        });
        let resp = self
            .gateway
            .post_json(
                Surface::V4,
                &format!("{google_account_name}/locations:reportInsights"),
                token,
                &body,
            )
            .await?;

        let items = resp
            .get("locationMetrics")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        self.store_snapshots(location_id, SnapshotKind::Metric, items)
            .await
    }

    /// Paged GET over a list endpoint, concatenating `items_key` arrays
    /// until `nextPageToken` runs out.
    async fn pull_collection(
        &self,
        surface: Surface,
        path: &str,
        items_key: &str,
        token: &str,
    ) -> Result<Vec<Value>, SignpostError> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            self.limiter.until_ready().await;

            let sep = if path.contains('?') { '&' } else { '?' };
            let page_path = match &page_token {
                Some(t) => format!("{path}{sep}pageToken={t}"),
                None => path.to_string(),
            };

            let resp = self.gateway.get_json(surface, &page_path, token).await?;
            if let Some(page) = resp.get(items_key).and_then(Value::as_array) {
                items.extend(page.iter().cloned());
            }

            page_token = resp
                .get("nextPageToken")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }

        Ok(items)
    }

    async fn store_snapshots(
        &self,
        location_id: i64,
        kind: SnapshotKind,
        items: Vec<Value>,
    ) -> Result<usize, SignpostError> {
        let rows: Vec<SnapshotUpsert> = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| SnapshotUpsert {
                resource_name: item
                    .get("name")
                    .and_then(Value::as_str)
                    .map_or_else(|| format!("{}:{i}", kind.as_str()), str::to_string),
                payload: item.to_string(),
            })
            .collect();

        self.db
            .replace_snapshots(SnapshotBatch {
                location_id,
                kind,
                items: rows,
            })
            .await
    }
}

fn accumulate(
    slot: &mut usize,
    entity: &str,
    result: Result<usize, SignpostError>,
    failures: &mut Vec<SyncFailure>,
) {
    match result {
        Ok(count) => *slot += count,
        Err(e) => failures.push(SyncFailure {
            entity: entity.to_string(),
            error: e.to_string(),
        }),
    }
}
