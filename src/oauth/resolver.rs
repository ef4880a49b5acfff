use crate::config::GoogleConfig;
use crate::db::{AccountPatch, DbAccount, DbHandle};
use crate::error::{IsRetryable, OauthError, SignpostError};
use crate::oauth::endpoints::GoogleOauthEndpoints;
use backon::{ExponentialBuilder, Retryable};
use chrono::{Duration as ChronoDuration, Utc};
use oauth2::TokenResponse;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Assumed lifetime when the token endpoint omits `expires_in`. Google always
/// sends it in practice; this keeps the expiry column non-null regardless.
const FALLBACK_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Resolves a currently-valid access token for an account, refreshing lazily.
///
/// The fast path (stored token with a strictly-future expiry) performs zero
/// network calls and dominates steady-state traffic. The slow path refreshes
/// against the identity provider and performs exactly one credential-store
/// write before returning.
///
/// Per-account single-flight: concurrent resolvers for the same account
/// serialize on an in-process async lock around the check-refresh-write
/// section, so a provider that rotates refresh tokens on every exchange
/// cannot have two refreshes race and persist a stale rotation.
pub struct TokenResolver {
    db: DbHandle,
    cfg: Arc<GoogleConfig>,
    http: reqwest::Client,
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
    retry_policy: ExponentialBuilder,
}

impl TokenResolver {
    pub fn new(db: DbHandle, cfg: Arc<GoogleConfig>, http: reqwest::Client) -> Self {
        let retry_policy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(5))
            .with_max_times(cfg.retry_max_times)
            .with_jitter();

        Self {
            db,
            cfg,
            http,
            locks: Mutex::new(HashMap::new()),
            retry_policy,
        }
    }

    /// Returns a currently-valid bearer token for `account_id`.
    ///
    /// Errors: [`SignpostError::NoRefreshToken`] when the account cannot
    /// self-refresh (owner must reconnect), [`SignpostError::AuthExpired`]
    /// when the grant itself is revoked, transient/network errors otherwise.
    pub async fn valid_access_token(&self, account_id: i64) -> Result<String, SignpostError> {
        let account = self.db.get_account(account_id).await?;

        let now = Utc::now();
        if account.token_is_fresh(now) {
            // Fast path: stored token returned unchanged, no network call.
            return Ok(account.access_token.clone().unwrap_or_default());
        }

        let lock = self.account_lock(account_id).await;
        let _guard = lock.lock().await;

        // Another resolver may have refreshed while we waited on the lock.
        let account = self.db.get_account(account_id).await?;
        if account.token_is_fresh(Utc::now()) {
            return Ok(account.access_token.clone().unwrap_or_default());
        }

        self.refresh_and_store(&account).await
    }

    async fn account_lock(&self, account_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(account_id).or_default().clone()
    }

    async fn refresh_and_store(&self, account: &DbAccount) -> Result<String, SignpostError> {
        let refresh_token = account
            .refresh_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(SignpostError::NoRefreshToken(account.id))?;

        let token = (|| async {
            GoogleOauthEndpoints::refresh_access_token(
                &self.cfg,
                refresh_token,
                self.http.clone(),
            )
            .await
        })
        .retry(self.retry_policy)
        .when(|e: &OauthError| e.is_retryable())
        .notify(|err, dur: Duration| {
            warn!(
                account_id = account.id,
                error = %err,
                "token refresh retrying after {:?}",
                dur
            );
        })
        .await
        .map_err(|e| {
            if e.is_invalid_grant() {
                SignpostError::AuthExpired(e.to_string())
            } else {
                SignpostError::from(e)
            }
        })?;

        let access_token = token.access_token().secret().to_string();
        let lifetime = token
            .expires_in()
            .map_or(FALLBACK_TOKEN_LIFETIME_SECS, |d| {
                i64::try_from(d.as_secs()).unwrap_or(FALLBACK_TOKEN_LIFETIME_SECS)
            });
        let expires_at = Utc::now() + ChronoDuration::seconds(lifetime);

        // Google may rotate the refresh token on exchange. Persisting the
        // rotation is correctness-critical: dropping it silently invalidates
        // every future refresh for this account.
        let rotated = token.refresh_token().map(|t| t.secret().to_string());
        if rotated.is_some() {
            debug!(account_id = account.id, "refresh token rotated by provider");
        }

        // Exactly one credential-store write per refresh.
        self.db
            .patch_account(
                account.id,
                AccountPatch {
                    access_token: Some(access_token.clone()),
                    refresh_token: rotated,
                    token_expires_at: Some(expires_at),
                    ..Default::default()
                },
            )
            .await?;

        info!(
            account_id = account.id,
            expires_at = %expires_at,
            "access token refreshed"
        );
        Ok(access_token)
    }
}
