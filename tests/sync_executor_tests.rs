use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use chrono::{Duration, Utc};
use signpost::config::{GoogleConfig, SyncConfig};
use signpost::db::{AccountCreate, AccountPatch, AccountSettings, SyncCadence};
use signpost::error::SignpostError;
use signpost::gateway::GbpClient;
use signpost::oauth::TokenResolver;
use signpost::sync::{SyncEngine, SyncType};
use serde_json::json;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::TcpListener;
use url::Url;

const ACCOUNT_NAME: &str = "accounts/111";

/// One mock server hosting all three GBP surfaces under distinct prefixes.
/// `fail_posts`/`fail_locations` steer which pulls break.
fn surfaces_app(fail_locations: bool, fail_posts: bool) -> Router {
    let locations: axum::routing::MethodRouter = if fail_locations {
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))) })
    } else {
        get(|| async {
            Json(json!({
                "locations": [
                    { "name": "locations/1", "title": "Corner Cafe" }
                ]
            }))
        })
    };

    let posts: axum::routing::MethodRouter = if fail_posts {
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))) })
    } else {
        get(|| async { Json(json!({ "localPosts": [] })) })
    };

    Router::new()
        .route("/bi/accounts/111/locations", locations)
        .route(
            "/v4/locations/1/reviews",
            get(|| async {
                Json(json!({
                    "reviews": [
                        { "name": "reviews/a", "starRating": "FIVE" },
                        { "name": "reviews/b", "starRating": "TWO" }
                    ]
                }))
            }),
        )
        .route("/v4/locations/1/localPosts", posts)
        .route(
            "/v4/locations/1/media",
            get(|| async { Json(json!({ "mediaItems": [] })) }),
        )
        .route(
            "/v4/accounts/111/locations:reportInsights",
            post(|| async {
                Json(json!({
                    "locationMetrics": [
                        { "locationName": "locations/1", "metricValues": [] }
                    ]
                }))
            }),
        )
        .route(
            "/qna/locations/1/questions",
            get(|| async {
                Json(json!({
                    "questions": [ { "name": "locations/1/questions/q1", "text": "Parking?" } ]
                }))
            }),
        )
}

async fn spawn_surfaces(app: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let base = Url::parse(&format!("http://{}", addr)).expect("valid base url");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });
    base
}

fn make_cfg(base: &Url) -> GoogleConfig {
    GoogleConfig {
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        business_information_url: base.join("/bi").unwrap(),
        qna_url: base.join("/qna").unwrap(),
        v4_url: base.join("/v4").unwrap(),
        retry_max_times: 0,
        ..GoogleConfig::default()
    }
}

async fn spawn_db(tag: &str) -> signpost::db::DbHandle {
    let tmp_dir = std::env::temp_dir();
    let mut hasher = DefaultHasher::new();
    SystemTime::now().hash(&mut hasher);
    let db_path = tmp_dir.join(format!("test_sync_{tag}_{}.sqlite", hasher.finish()));
    let database_url = format!("sqlite:{}", db_path.to_str().unwrap());
    signpost::db::spawn(&database_url).await
}

fn make_engine(db: signpost::db::DbHandle, cfg: GoogleConfig) -> SyncEngine {
    let cfg = Arc::new(cfg);
    let http = reqwest::Client::new();
    let resolver = Arc::new(TokenResolver::new(db.clone(), cfg.clone(), http.clone()));
    let gateway = Arc::new(GbpClient::new(cfg, http));
    SyncEngine::new(db, resolver, gateway, SyncConfig::default())
}

async fn connected_account(db: &signpost::db::DbHandle, cadence: SyncCadence) -> i64 {
    db.create_account(AccountCreate {
        user_id: "user-1".to_string(),
        label: "Main listing".to_string(),
        google_account_name: ACCOUNT_NAME.to_string(),
        access_token: Some("fresh-access".to_string()),
        refresh_token: Some("refresh-1".to_string()),
        token_expires_at: Some(Utc::now() + Duration::hours(1)),
        settings: AccountSettings {
            sync_cadence: cadence,
            ..AccountSettings::default()
        },
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn partial_failure_is_isolated_and_last_sync_advances() {
    let base = spawn_surfaces(surfaces_app(false, true)).await;
    let db = spawn_db("partial").await;
    let account_id = connected_account(&db, SyncCadence::Daily).await;
    let engine = make_engine(db.clone(), make_cfg(&base));

    let report = engine
        .sync_account(account_id, SyncType::Full)
        .await
        .expect("a dependent-pull failure must not abort the sync");

    assert_eq!(report.locations, 1);
    assert_eq!(report.reviews, 2);
    assert_eq!(report.questions, 1);
    assert_eq!(report.metrics, 1);
    assert_eq!(report.posts, 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].entity, "posts");
    assert_eq!(report.status(), "partial");
    assert!(report.last_sync_advanced);

    let account = db.get_account(account_id).await.unwrap();
    assert!(
        account.last_sync.is_some(),
        "locations succeeded, so last_sync must advance"
    );

    // The pulled data landed despite the posts failure.
    let locations = db.list_locations(account_id).await.unwrap();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].resource_name, "locations/1");
}

#[tokio::test]
async fn locations_failure_aborts_without_advancing_last_sync() {
    let base = spawn_surfaces(surfaces_app(true, false)).await;
    let db = spawn_db("locfail").await;
    let account_id = connected_account(&db, SyncCadence::Daily).await;
    let engine = make_engine(db.clone(), make_cfg(&base));

    let err = engine
        .sync_account(account_id, SyncType::Full)
        .await
        .unwrap_err();
    assert!(
        matches!(err, SignpostError::Transient { .. }),
        "got: {err:?}"
    );

    let account = db.get_account(account_id).await.unwrap();
    assert!(
        account.last_sync.is_none(),
        "a failed primary pull must not advance last_sync"
    );
}

#[tokio::test]
async fn inactive_account_is_rejected() {
    let base = spawn_surfaces(surfaces_app(false, false)).await;
    let db = spawn_db("inactive").await;
    let account_id = connected_account(&db, SyncCadence::Daily).await;
    db.patch_account(
        account_id,
        AccountPatch {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let engine = make_engine(db, make_cfg(&base));
    let err = engine
        .sync_account(account_id, SyncType::Full)
        .await
        .unwrap_err();
    assert!(matches!(err, SignpostError::Forbidden(_)), "got: {err:?}");
}

#[tokio::test]
async fn scheduler_pass_skips_manual_accounts() {
    let base = spawn_surfaces(surfaces_app(false, false)).await;
    let db = spawn_db("pass").await;

    // Never-synced hourly account: due at any tick. Manual account: never due.
    let due_id = connected_account(&db, SyncCadence::Hourly).await;
    let manual_id = db
        .create_account(AccountCreate {
            user_id: "user-1".to_string(),
            label: "Manual listing".to_string(),
            google_account_name: "accounts/222".to_string(),
            access_token: Some("fresh-access".to_string()),
            refresh_token: Some("refresh-2".to_string()),
            token_expires_at: Some(Utc::now() + Duration::hours(1)),
            settings: AccountSettings {
                sync_cadence: SyncCadence::Manual,
                ..AccountSettings::default()
            },
        })
        .await
        .unwrap();

    let engine = make_engine(db.clone(), make_cfg(&base));
    let summary = engine.run_scheduler_pass(Utc::now()).await.unwrap();

    assert_eq!(summary.synced, 1);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.results.len(), 1);
    assert_eq!(summary.results[0].account_id, due_id);

    let manual = db.get_account(manual_id).await.unwrap();
    assert!(manual.last_sync.is_none(), "manual accounts never auto-sync");
}

#[tokio::test]
async fn scheduler_pass_isolates_reconnect_required_accounts() {
    let base = spawn_surfaces(surfaces_app(false, false)).await;
    let db = spawn_db("reconnect").await;

    // Broken account (no refresh token, stale access token) alongside a
    // healthy one; the pass must finish both.
    let broken_id = db
        .create_account(AccountCreate {
            user_id: "user-1".to_string(),
            label: "Broken listing".to_string(),
            google_account_name: "accounts/333".to_string(),
            access_token: None,
            refresh_token: None,
            token_expires_at: None,
            settings: AccountSettings {
                sync_cadence: SyncCadence::Hourly,
                ..AccountSettings::default()
            },
        })
        .await
        .unwrap();
    let healthy_id = connected_account(&db, SyncCadence::Hourly).await;

    let engine = make_engine(db, make_cfg(&base));
    let summary = engine.run_scheduler_pass(Utc::now()).await.unwrap();

    assert_eq!(summary.synced, 1);
    assert_eq!(summary.errors, 1);

    let broken: Vec<_> = summary
        .results
        .iter()
        .filter(|r| r.account_id == broken_id)
        .collect();
    assert_eq!(broken.len(), 1);
    assert!(broken[0].needs_reconnect, "token failure must be flagged as reconnect-required");
    assert!(
        summary
            .results
            .iter()
            .any(|r| r.account_id == healthy_id && r.report.is_some()),
        "the healthy account must still sync"
    );
}
