use crate::config::GoogleConfig;
use crate::error::{IsRetryable, SignpostError};
use backon::{ExponentialBuilder, Retryable};
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Truncation limit for upstream error bodies kept for diagnostics.
const BODY_PREVIEW_CHARS: usize = 512;

/// The three logically distinct GBP resource families. All are consumed
/// identically; only the base URL differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// Business Information API (locations, attributes).
    BusinessInformation,
    /// Q&A API (questions, answers).
    Qna,
    /// Legacy v4 API (reviews, local posts, media, report insights).
    V4,
}

/// Bearer-auth JSON client over the GBP surfaces. Reads retry transient
/// failures with bounded backoff; mutations are single-shot by design, since
/// retrying a non-idempotent POST risks double-posting (retry is a caller
/// policy, applied only where the caller can prove idempotence).
pub struct GbpClient {
    cfg: Arc<GoogleConfig>,
    http: reqwest::Client,
    retry_policy: ExponentialBuilder,
}

impl GbpClient {
    pub fn new(cfg: Arc<GoogleConfig>, http: reqwest::Client) -> Self {
        let retry_policy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(250))
            .with_max_delay(Duration::from_secs(4))
            .with_max_times(cfg.retry_max_times)
            .with_jitter();

        Self {
            cfg,
            http,
            retry_policy,
        }
    }

    fn base(&self, surface: Surface) -> &Url {
        match surface {
            Surface::BusinessInformation => &self.cfg.business_information_url,
            Surface::Qna => &self.cfg.qna_url,
            Surface::V4 => &self.cfg.v4_url,
        }
    }

    fn url(&self, surface: Surface, path: &str) -> Result<Url, SignpostError> {
        let base = self.base(surface).as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    /// GET with bounded transient retry.
    pub async fn get_json(
        &self,
        surface: Surface,
        path: &str,
        access_token: &str,
    ) -> Result<Value, SignpostError> {
        let url = self.url(surface, path)?;

        (|| {
            let url = url.clone();
            async move {
                let resp = self
                    .http
                    .get(url)
                    .bearer_auth(access_token)
                    .send()
                    .await?;
                read_json(resp).await
            }
        })
        .retry(self.retry_policy)
        .when(|e: &SignpostError| e.is_retryable())
        .notify(|err, dur: Duration| {
            tracing::warn!(error = %err, "GBP read retrying after {:?}", dur);
        })
        .await
    }

    /// Single-shot POST; never retried internally.
    pub async fn post_json(
        &self,
        surface: Surface,
        path: &str,
        access_token: &str,
        body: &Value,
    ) -> Result<Value, SignpostError> {
        let url = self.url(surface, path)?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(access_token)
            .json(body)
            .send()
            .await?;
        read_json(resp).await
    }

    /// Single-shot PUT; never retried internally. The v4 review reply
    /// endpoint is PUT-shaped (upsert of the one reply slot).
    pub async fn put_json(
        &self,
        surface: Surface,
        path: &str,
        access_token: &str,
        body: &Value,
    ) -> Result<Value, SignpostError> {
        let url = self.url(surface, path)?;
        let resp = self
            .http
            .put(url)
            .bearer_auth(access_token)
            .json(body)
            .send()
            .await?;
        read_json(resp).await
    }
}

async fn read_json(resp: reqwest::Response) -> Result<Value, SignpostError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }

    let body = match resp.text().await {
        Ok(text) => text,
        Err(e) => format!("<failed to read body: {e}>"),
    };
    Err(classify_response(status, &body))
}

/// Map a non-2xx provider response to the error taxonomy. The raw body is
/// preserved (truncated) so support diagnosis keeps the original provider
/// error text.
pub fn classify_response(status: StatusCode, body: &str) -> SignpostError {
    let preview = truncate(body, BODY_PREVIEW_CHARS);

    match status {
        StatusCode::UNAUTHORIZED => SignpostError::AuthExpired(preview),
        StatusCode::FORBIDDEN => {
            let lower = body.to_ascii_lowercase();
            if lower.contains("insufficient") && lower.contains("scope") {
                SignpostError::InsufficientScopes(preview)
            } else {
                SignpostError::Forbidden(preview)
            }
        }
        StatusCode::NOT_FOUND => SignpostError::NotFound(preview),
        StatusCode::TOO_MANY_REQUESTS => SignpostError::Transient {
            status: Some(status),
            detail: preview,
        },
        s if s.is_server_error() => SignpostError::Transient {
            status: Some(status),
            detail: preview,
        },
        s => SignpostError::Validation {
            status: s,
            detail: preview,
        },
    }
}

fn truncate(body: &str, limit: usize) -> String {
    body.char_indices()
        .nth(limit)
        .map(|(idx, _)| format!("{}...<truncated>", &body[..idx]))
        .unwrap_or_else(|| body.to_string())
}
