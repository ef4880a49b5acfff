use crate::error::SignpostError;
use crate::scheduler::{ScheduleView, select_due_accounts};
use crate::sync::executor::{SyncEngine, SyncReport, SyncType};
use chrono::{DateTime, Duration, Utc};
use futures::{StreamExt, stream};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

/// Outcome of one account's sync within a scheduler pass.
#[derive(Debug, Serialize)]
pub struct AccountSyncResult {
    pub account_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<SyncReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Distinct signal for auth-class failures: the owner must re-run the
    /// OAuth consent flow; retrying on the next tick cannot help.
    pub needs_reconnect: bool,
}

/// Summary returned to the external trigger.
#[derive(Debug, Serialize)]
pub struct PassSummary {
    pub synced: usize,
    pub errors: usize,
    pub results: Vec<AccountSyncResult>,
}

impl SyncEngine {
    /// Runs one scheduler pass at `now`: selects due accounts and syncs them
    /// concurrently, bounded by the configured worker limit.
    ///
    /// One account's failure (including token-resolution failure) never
    /// aborts the pass; it is recorded in the summary and the remaining
    /// accounts proceed.
    pub async fn run_scheduler_pass(&self, now: DateTime<Utc>) -> Result<PassSummary, SignpostError> {
        let accounts = self.db.list_active_accounts().await?;
        let views: Vec<ScheduleView> = accounts.iter().map(ScheduleView::from).collect();
        let due = select_due_accounts(
            now,
            &views,
            Duration::minutes(self.sync_cfg.min_interval_minutes),
        );

        info!(due = due.len(), total_active = views.len(), "scheduler pass starting");

        let worker_limit = self.sync_cfg.worker_limit.max(1);
        let results: Vec<AccountSyncResult> = stream::iter(due)
            .map(|account_id| async move {
                match self.sync_account(account_id, SyncType::Full).await {
                    Ok(report) => AccountSyncResult {
                        account_id,
                        report: Some(report),
                        error: None,
                        needs_reconnect: false,
                    },
                    Err(e) => {
                        warn!(account_id, error = %e, "account sync failed");
                        AccountSyncResult {
                            account_id,
                            report: None,
                            error: Some(e.to_string()),
                            needs_reconnect: e.needs_reconnect(),
                        }
                    }
                }
            })
            .buffer_unordered(worker_limit)
            .collect()
            .await;

        let synced = results.iter().filter(|r| r.report.is_some()).count();
        let errors = results.len() - synced;

        self.db.log_action(
            "scheduler_pass",
            if errors == 0 { "success" } else { "partial" },
            json!({ "synced": synced, "errors": errors }),
        );

        Ok(PassSummary {
            synced,
            errors,
            results,
        })
    }
}
