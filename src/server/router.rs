use crate::config::Config;
use crate::db::DbHandle;
use crate::gateway::GbpClient;
use crate::oauth::TokenResolver;
use crate::publish::PublishPipeline;
use crate::server::routes::{accounts, oauth, publish, sync};
use crate::sync::SyncEngine;

use axum::{
    Router,
    extract::{FromRef, Request},
    http::{HeaderName, StatusCode, Version, header::USER_AGENT},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use axum_extra::extract::cookie::Key;
use base64::Engine as _;
use rand::RngCore;
use reqwest::header::HeaderValue;
use std::time::Instant;
use std::{sync::Arc, sync::LazyLock, time::Duration};
use tracing::{error, info, warn};

pub const SIGNPOST_USER_AGENT: &str = "signpost/0.3";

/// Global cookie signing/encryption key for PrivateCookieJar.
static COOKIE_KEY: LazyLock<Key> = LazyLock::new(Key::generate);

const MAX_REQUEST_ID_LEN: usize = 128;
const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

fn generate_request_id() -> String {
    // 96 bits => 16 chars base64url (no padding).
    let mut bytes = [0u8; 12];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn format_http_version(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2",
        Version::HTTP_3 => "HTTP/3",
        _ => "HTTP/?",
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: DbHandle,
    pub google_cfg: Arc<crate::config::GoogleConfig>,
    pub http: reqwest::Client,
    pub resolver: Arc<TokenResolver>,
    pub gateway: Arc<GbpClient>,
    pub engine: Arc<SyncEngine>,
    pub publisher: Arc<PublishPipeline>,
    pub cron_secret: Arc<str>,
    pub insecure_cookie: bool,
}

impl AppState {
    pub fn new(db: DbHandle, cfg: &Config) -> Self {
        let google_cfg = Arc::new(cfg.google.clone());

        let mut builder = reqwest::Client::builder()
            .user_agent(SIGNPOST_USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .http2_adaptive_window(true);

        if let Some(proxy_url) = google_cfg.proxy.clone() {
            let proxy = reqwest::Proxy::all(proxy_url.as_str())
                .expect("invalid proxy url for reqwest client");
            builder = builder.proxy(proxy);
        }

        let http = builder.build().expect("failed to build reqwest client");

        let resolver = Arc::new(TokenResolver::new(
            db.clone(),
            google_cfg.clone(),
            http.clone(),
        ));
        let gateway = Arc::new(GbpClient::new(google_cfg.clone(), http.clone()));
        let engine = Arc::new(SyncEngine::new(
            db.clone(),
            resolver.clone(),
            gateway.clone(),
            cfg.sync.clone(),
        ));
        let publisher = Arc::new(PublishPipeline::new(
            db.clone(),
            resolver.clone(),
            gateway.clone(),
        ));

        Self {
            db,
            google_cfg,
            http,
            resolver,
            gateway,
            engine,
            publisher,
            cron_secret: Arc::from(cfg.basic.cron_secret.as_str()),
            insecure_cookie: cfg.basic.insecure_cookie,
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        let _ = state; // state not used to fetch the static key
        COOKIE_KEY.clone()
    }
}

async fn not_found_handler() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn access_log(req: Request, next: Next) -> Response {
    // Capture request metadata before moving `req` into the handler stack.
    let method = req.method().clone();
    let uri = req.uri().clone();
    let version = req.version();

    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(generate_request_id);

    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let start = Instant::now();
    let mut resp = next.run(req).await;

    // Always reflect `x-request-id` for easier correlation, even if the client didn't send one.
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        resp.headers_mut().insert(X_REQUEST_ID, value);
    }

    let status = resp.status();
    let latency_ms = start.elapsed().as_millis() as u64;
    let path = uri.path();
    let protocol = format_http_version(version);

    if status.is_server_error() {
        error!(
            "| {:>3} | {} | {:^7} | {:<8} | {} | {}ms | {}",
            status.as_u16(),
            request_id,
            method.as_str(),
            protocol,
            path,
            latency_ms,
            user_agent
        );
    } else if status.is_client_error() {
        warn!(
            "| {:>3} | {} | {:^7} | {:<8} | {} | {}ms | {}",
            status.as_u16(),
            request_id,
            method.as_str(),
            protocol,
            path,
            latency_ms,
            user_agent
        );
    } else {
        info!(
            "| {:>3} | {} | {:^7} | {:<8} | {} | {}ms | {}",
            status.as_u16(),
            request_id,
            method.as_str(),
            protocol,
            path,
            latency_ms,
            user_agent
        );
    }

    resp
}

pub fn signpost_router(state: AppState) -> Router {
    let oauth = Router::new()
        .route("/oauth/connect", get(oauth::oauth_entry))
        .route("/oauth/callback", get(oauth::oauth_callback));

    let internal = Router::new()
        .route("/internal/cron/sync", post(sync::cron_sync))
        .route("/internal/actions", get(accounts::recent_actions));

    let dashboard = Router::new()
        .route("/accounts", get(accounts::list_accounts))
        .route("/accounts/{id}/sync", post(sync::manual_sync))
        .route("/accounts/{id}/settings", post(accounts::update_settings))
        .route("/accounts/{id}/disconnect", post(accounts::disconnect))
        .route("/publishables", post(publish::create_draft))
        .route("/publishables/{id}/publish", post(publish::publish_entity));

    Router::new()
        .merge(oauth)
        .merge(internal)
        .merge(dashboard)
        .fallback(not_found_handler)
        .with_state(state)
        .layer(middleware::from_fn(access_log))
}
