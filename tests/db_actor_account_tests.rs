use chrono::{Duration, Utc};
use signpost::db::{
    AccountCreate, AccountPatch, AccountSettings, PublishKind, PublishStatus, PublishableCreate,
    PublishablePatch, SnapshotBatch, SnapshotKind, SnapshotUpsert, SyncCadence,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::SystemTime;
use tokio::fs;

fn temp_database_url(tag: &str) -> (std::path::PathBuf, String) {
    let tmp_dir = std::env::temp_dir();
    let mut hasher = DefaultHasher::new();
    SystemTime::now().hash(&mut hasher);
    let db_file_name = format!("test_signpost_{tag}_{}.sqlite", hasher.finish());
    let db_path = tmp_dir.join(db_file_name);
    let database_url = format!("sqlite:{}", db_path.to_str().unwrap());
    (db_path, database_url)
}

async fn cleanup(db_path: &std::path::Path) {
    let wal_path = std::path::PathBuf::from(format!("{}-wal", db_path.to_string_lossy()));
    let shm_path = std::path::PathBuf::from(format!("{}-shm", db_path.to_string_lossy()));
    let _ = fs::remove_file(&wal_path).await;
    let _ = fs::remove_file(&shm_path).await;
    let _ = fs::remove_file(db_path).await;
}

fn sample_create(user_id: &str, account_name: &str) -> AccountCreate {
    AccountCreate {
        user_id: user_id.to_string(),
        label: "Main listing".to_string(),
        google_account_name: account_name.to_string(),
        access_token: Some("access-1".to_string()),
        refresh_token: Some("refresh-1".to_string()),
        token_expires_at: Some(Utc::now() + Duration::hours(1)),
        settings: AccountSettings {
            sync_cadence: SyncCadence::Hourly,
            ..AccountSettings::default()
        },
    }
}

#[tokio::test]
async fn test_account_db_actor_baseline() {
    let (db_path, database_url) = temp_database_url("accounts");
    let db = signpost::db::spawn(&database_url).await;

    // 1. Fresh DB has no active accounts.
    let active = db.list_active_accounts().await.unwrap();
    assert!(active.is_empty(), "Expected no active accounts initially");

    // 2. Create an account and read it back.
    let id = db
        .create_account(sample_create("user-1", "accounts/111"))
        .await
        .unwrap();
    assert!(id > 0, "Expected a valid ID after creation");

    let account = db.get_account(id).await.unwrap();
    assert_eq!(account.user_id, "user-1");
    assert_eq!(account.google_account_name, "accounts/111");
    assert!(account.is_active);
    assert_eq!(account.access_token.as_deref(), Some("access-1"));
    assert_eq!(account.settings().sync_cadence, SyncCadence::Hourly);
    assert!(account.last_sync.is_none());

    // 3. Ownership: the wrong user cannot see it.
    assert!(db.get_owned_account(id, "user-1").await.is_ok());
    assert!(db.get_owned_account(id, "someone-else").await.is_err());

    // 4. Patch tokens; untouched fields survive.
    db.patch_account(
        id,
        AccountPatch {
            access_token: Some("access-2".to_string()),
            token_expires_at: Some(Utc::now() + Duration::hours(2)),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let account = db.get_account(id).await.unwrap();
    assert_eq!(account.access_token.as_deref(), Some("access-2"));
    assert_eq!(account.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(account.label, "Main listing");

    // 5. Reconnect upserts on (user_id, google_account_name) instead of
    //    inserting a duplicate row.
    let mut reconnect = sample_create("user-1", "accounts/111");
    reconnect.refresh_token = Some("refresh-2".to_string());
    let id2 = db.create_account(reconnect).await.unwrap();
    assert_eq!(id2, id, "Reconnect should reuse the existing row");
    let account = db.get_account(id).await.unwrap();
    assert_eq!(account.refresh_token.as_deref(), Some("refresh-2"));
    assert_eq!(db.list_accounts_for_user("user-1").await.unwrap().len(), 1);

    // 6. Disconnect removes the account from the active set.
    db.patch_account(
        id,
        AccountPatch {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let active = db.list_active_accounts().await.unwrap();
    assert!(active.is_empty(), "Expected no active accounts after disconnect");

    cleanup(&db_path).await;
}

#[tokio::test]
async fn test_locations_and_snapshot_replacement() {
    let (db_path, database_url) = temp_database_url("snapshots");
    let db = signpost::db::spawn(&database_url).await;

    let account_id = db
        .create_account(sample_create("user-1", "accounts/222"))
        .await
        .unwrap();

    let upsert = signpost::db::LocationUpsert {
        account_id,
        resource_name: "locations/42".to_string(),
        title: Some("Corner Cafe".to_string()),
        payload: r#"{"name":"locations/42","title":"Corner Cafe"}"#.to_string(),
    };
    let loc_id = db.upsert_location(upsert.clone()).await.unwrap();
    // Upsert on resource_name keeps the row stable across repeated pulls.
    let loc_id_again = db.upsert_location(upsert).await.unwrap();
    assert_eq!(loc_id, loc_id_again);
    assert_eq!(db.list_locations(account_id).await.unwrap().len(), 1);

    let first_batch = SnapshotBatch {
        location_id: loc_id,
        kind: SnapshotKind::Review,
        items: vec![
            SnapshotUpsert {
                resource_name: "reviews/a".to_string(),
                payload: r#"{"name":"reviews/a","starRating":"FIVE"}"#.to_string(),
            },
            SnapshotUpsert {
                resource_name: "reviews/b".to_string(),
                payload: r#"{"name":"reviews/b","starRating":"TWO"}"#.to_string(),
            },
        ],
    };
    assert_eq!(db.replace_snapshots(first_batch).await.unwrap(), 2);

    // Replacement semantics: the second pull wins wholesale.
    let second_batch = SnapshotBatch {
        location_id: loc_id,
        kind: SnapshotKind::Review,
        items: vec![SnapshotUpsert {
            resource_name: "reviews/c".to_string(),
            payload: r#"{"name":"reviews/c","starRating":"FOUR"}"#.to_string(),
        }],
    };
    assert_eq!(db.replace_snapshots(second_batch).await.unwrap(), 1);

    cleanup(&db_path).await;
}

#[tokio::test]
async fn test_publishable_lifecycle_and_action_log() {
    let (db_path, database_url) = temp_database_url("publishables");
    let db = signpost::db::spawn(&database_url).await;

    let account_id = db
        .create_account(sample_create("user-1", "accounts/333"))
        .await
        .unwrap();
    let location_id = db
        .upsert_location(signpost::db::LocationUpsert {
            account_id,
            resource_name: "locations/7".to_string(),
            title: None,
            payload: "{}".to_string(),
        })
        .await
        .unwrap();

    let entity_id = db
        .create_publishable(PublishableCreate {
            account_id,
            location_id,
            kind: PublishKind::Post,
            body: r#"{"summary":"We are open late on Fridays"}"#.to_string(),
            target_resource: "accounts/333/locations/7/localPosts".to_string(),
        })
        .await
        .unwrap();

    let entity = db.get_publishable(entity_id).await.unwrap();
    assert_eq!(entity.status, PublishStatus::Draft);
    assert!(entity.provider_resource_id.is_none());

    db.patch_publishable(
        entity_id,
        PublishablePatch {
            status: Some(PublishStatus::Published),
            provider_resource_id: Some("localPosts/99".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let entity = db.get_publishable(entity_id).await.unwrap();
    assert_eq!(entity.status, PublishStatus::Published);
    assert_eq!(entity.provider_resource_id.as_deref(), Some("localPosts/99"));

    // Action log is a cast: give the actor a beat to process it.
    db.log_action(
        "publish",
        "success",
        serde_json::json!({ "entity_id": entity_id }),
    );
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let entries = db.list_action_log(10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "publish");
    assert_eq!(entries[0].status, "success");

    cleanup(&db_path).await;
}
