use crate::db::models::{DbAccount, DbActionLogEntry, DbLocation, DbPublishable};
use crate::db::patch::{
    AccountCreate, AccountPatch, PublishableCreate, PublishablePatch, SnapshotBatch,
};
use crate::db::schema::SQLITE_INIT;
use crate::error::SignpostError;
use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::{str::FromStr, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub enum DbActorMessage {
    /// Create (or upsert) an account record and return its id.
    CreateAccount(AccountCreate, RpcReplyPort<Result<i64, SignpostError>>),

    /// Patch an account row by id.
    PatchAccount(
        i64,
        AccountPatch,
        RpcReplyPort<Result<(), SignpostError>>,
    ),

    /// Get an account by id.
    GetAccount(i64, RpcReplyPort<Result<DbAccount, SignpostError>>),

    /// Get an account by id, scoped to its owning user.
    GetOwnedAccount {
        id: i64,
        user_id: String,
        reply: RpcReplyPort<Result<DbAccount, SignpostError>>,
    },

    /// List active accounts (is_active = 1).
    ListActiveAccounts(RpcReplyPort<Result<Vec<DbAccount>, SignpostError>>),

    /// List all accounts owned by one user, active or not.
    ListAccountsForUser(String, RpcReplyPort<Result<Vec<DbAccount>, SignpostError>>),

    /// Upsert a location by provider resource name; returns its local id.
    UpsertLocation(
        crate::db::patch::LocationUpsert,
        RpcReplyPort<Result<i64, SignpostError>>,
    ),

    /// List locations for one account.
    ListLocations(i64, RpcReplyPort<Result<Vec<DbLocation>, SignpostError>>),

    /// Upsert a batch of pulled rows for one (location, kind); returns count.
    ReplaceSnapshots(SnapshotBatch, RpcReplyPort<Result<usize, SignpostError>>),

    /// Create a draft publishable and return its id.
    CreatePublishable(
        PublishableCreate,
        RpcReplyPort<Result<i64, SignpostError>>,
    ),

    /// Get a publishable by id.
    GetPublishable(i64, RpcReplyPort<Result<DbPublishable, SignpostError>>),

    /// Patch a publishable by id.
    PatchPublishable(
        i64,
        PublishablePatch,
        RpcReplyPort<Result<(), SignpostError>>,
    ),

    /// Append an action-log row. Fire-and-forget: no reply port by design,
    /// so a logging failure can never fail the operation being logged.
    LogAction {
        action: String,
        status: String,
        details: Value,
    },

    /// Most recent action-log rows, newest first.
    ListActionLog(
        i64,
        RpcReplyPort<Result<Vec<DbActionLogEntry>, SignpostError>>,
    ),
}

#[derive(Clone)]
pub struct DbHandle {
    actor: ActorRef<DbActorMessage>,
}

impl DbHandle {
    pub async fn create_account(&self, create: AccountCreate) -> Result<i64, SignpostError> {
        ractor::call!(self.actor, DbActorMessage::CreateAccount, create)
            .map_err(|e| SignpostError::Ractor(format!("DbActor CreateAccount RPC failed: {e}")))?
    }

    pub async fn patch_account(&self, id: i64, patch: AccountPatch) -> Result<(), SignpostError> {
        ractor::call!(self.actor, DbActorMessage::PatchAccount, id, patch)
            .map_err(|e| SignpostError::Ractor(format!("DbActor PatchAccount RPC failed: {e}")))?
    }

    pub async fn get_account(&self, id: i64) -> Result<DbAccount, SignpostError> {
        ractor::call!(self.actor, DbActorMessage::GetAccount, id)
            .map_err(|e| SignpostError::Ractor(format!("DbActor GetAccount RPC failed: {e}")))?
    }

    pub async fn get_owned_account(
        &self,
        id: i64,
        user_id: &str,
    ) -> Result<DbAccount, SignpostError> {
        let user_id = user_id.to_string();
        ractor::call!(self.actor, |reply| DbActorMessage::GetOwnedAccount {
            id,
            user_id,
            reply
        })
        .map_err(|e| SignpostError::Ractor(format!("DbActor GetOwnedAccount RPC failed: {e}")))?
    }

    pub async fn list_active_accounts(&self) -> Result<Vec<DbAccount>, SignpostError> {
        ractor::call!(self.actor, DbActorMessage::ListActiveAccounts).map_err(|e| {
            SignpostError::Ractor(format!("DbActor ListActiveAccounts RPC failed: {e}"))
        })?
    }

    pub async fn list_accounts_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<DbAccount>, SignpostError> {
        ractor::call!(
            self.actor,
            DbActorMessage::ListAccountsForUser,
            user_id.to_string()
        )
        .map_err(|e| SignpostError::Ractor(format!("DbActor ListAccountsForUser RPC failed: {e}")))?
    }

    pub async fn upsert_location(
        &self,
        upsert: crate::db::patch::LocationUpsert,
    ) -> Result<i64, SignpostError> {
        ractor::call!(self.actor, DbActorMessage::UpsertLocation, upsert)
            .map_err(|e| SignpostError::Ractor(format!("DbActor UpsertLocation RPC failed: {e}")))?
    }

    pub async fn list_locations(&self, account_id: i64) -> Result<Vec<DbLocation>, SignpostError> {
        ractor::call!(self.actor, DbActorMessage::ListLocations, account_id)
            .map_err(|e| SignpostError::Ractor(format!("DbActor ListLocations RPC failed: {e}")))?
    }

    pub async fn replace_snapshots(&self, batch: SnapshotBatch) -> Result<usize, SignpostError> {
        ractor::call!(self.actor, DbActorMessage::ReplaceSnapshots, batch).map_err(|e| {
            SignpostError::Ractor(format!("DbActor ReplaceSnapshots RPC failed: {e}"))
        })?
    }

    pub async fn create_publishable(
        &self,
        create: PublishableCreate,
    ) -> Result<i64, SignpostError> {
        ractor::call!(self.actor, DbActorMessage::CreatePublishable, create).map_err(|e| {
            SignpostError::Ractor(format!("DbActor CreatePublishable RPC failed: {e}"))
        })?
    }

    pub async fn get_publishable(&self, id: i64) -> Result<DbPublishable, SignpostError> {
        ractor::call!(self.actor, DbActorMessage::GetPublishable, id)
            .map_err(|e| SignpostError::Ractor(format!("DbActor GetPublishable RPC failed: {e}")))?
    }

    pub async fn patch_publishable(
        &self,
        id: i64,
        patch: PublishablePatch,
    ) -> Result<(), SignpostError> {
        ractor::call!(self.actor, DbActorMessage::PatchPublishable, id, patch).map_err(|e| {
            SignpostError::Ractor(format!("DbActor PatchPublishable RPC failed: {e}"))
        })?
    }

    /// Best-effort append to the action log. Never returns an error: a
    /// diagnostic write must not fail or roll back the operation it records.
    pub fn log_action(&self, action: &str, status: &str, details: Value) {
        let msg = DbActorMessage::LogAction {
            action: action.to_string(),
            status: status.to_string(),
            details,
        };
        if let Err(e) = self.actor.cast(msg) {
            warn!(action, error = %e, "action log write dropped");
        }
    }

    pub async fn list_action_log(
        &self,
        limit: i64,
    ) -> Result<Vec<DbActionLogEntry>, SignpostError> {
        ractor::call!(self.actor, DbActorMessage::ListActionLog, limit)
            .map_err(|e| SignpostError::Ractor(format!("DbActor ListActionLog RPC failed: {e}")))?
    }
}

struct DbActorState {
    pool: SqlitePool,
}

struct DbActor;

#[ractor::async_trait]
impl Actor for DbActor {
    type Msg = DbActorMessage;
    type State = DbActorState;
    type Arguments = String;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        database_url: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let connect_opts = SqliteConnectOptions::from_str(database_url.as_str())
            .map_err(|e| ActorProcessingErr::from(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .connect_with(connect_opts)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db connect failed: {e}")))?;

        apply_schema(&pool)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db schema init failed: {e}")))?;

        info!("DbActor initialized");
        Ok(DbActorState { pool })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            DbActorMessage::CreateAccount(create, reply) => {
                let _ = reply.send(create_account(&state.pool, create).await);
            }
            DbActorMessage::PatchAccount(id, patch, reply) => {
                let _ = reply.send(patch_account(&state.pool, id, patch).await);
            }
            DbActorMessage::GetAccount(id, reply) => {
                let _ = reply.send(get_account(&state.pool, id).await);
            }
            DbActorMessage::GetOwnedAccount { id, user_id, reply } => {
                let _ = reply.send(get_owned_account(&state.pool, id, &user_id).await);
            }
            DbActorMessage::ListActiveAccounts(reply) => {
                let _ = reply.send(list_active_accounts(&state.pool).await);
            }
            DbActorMessage::ListAccountsForUser(user_id, reply) => {
                let _ = reply.send(list_accounts_for_user(&state.pool, &user_id).await);
            }
            DbActorMessage::UpsertLocation(upsert, reply) => {
                let _ = reply.send(upsert_location(&state.pool, upsert).await);
            }
            DbActorMessage::ListLocations(account_id, reply) => {
                let _ = reply.send(list_locations(&state.pool, account_id).await);
            }
            DbActorMessage::ReplaceSnapshots(batch, reply) => {
                let _ = reply.send(replace_snapshots(&state.pool, batch).await);
            }
            DbActorMessage::CreatePublishable(create, reply) => {
                let _ = reply.send(create_publishable(&state.pool, create).await);
            }
            DbActorMessage::GetPublishable(id, reply) => {
                let _ = reply.send(get_publishable(&state.pool, id).await);
            }
            DbActorMessage::PatchPublishable(id, patch, reply) => {
                let _ = reply.send(patch_publishable(&state.pool, id, patch).await);
            }
            DbActorMessage::LogAction {
                action,
                status,
                details,
            } => {
                if let Err(e) = append_action_log(&state.pool, &action, &status, &details).await {
                    warn!(action, error = %e, "action log insert failed");
                }
            }
            DbActorMessage::ListActionLog(limit, reply) => {
                let _ = reply.send(list_action_log(&state.pool, limit).await);
            }
        }
        Ok(())
    }
}

async fn create_account(pool: &SqlitePool, create: AccountCreate) -> Result<i64, SignpostError> {
    let now = Utc::now();
    let settings = serde_json::to_string(&create.settings)?;

    let id: i64 = sqlx::query_scalar(
        r#"
    INSERT INTO accounts (
        user_id, label, google_account_name, is_active,
        access_token, refresh_token, token_expires_at, settings,
        last_sync, created_at, updated_at
    )
    VALUES (?, ?, ?, 1, ?, ?, ?, ?, NULL, ?, ?)
    ON CONFLICT(user_id, google_account_name) DO UPDATE SET
        label=excluded.label,
        is_active=1,
        access_token=excluded.access_token,
        refresh_token=excluded.refresh_token,
        token_expires_at=excluded.token_expires_at,
        updated_at=excluded.updated_at
    RETURNING id
    "#,
    )
    .bind(create.user_id)
    .bind(create.label)
    .bind(create.google_account_name)
    .bind(create.access_token)
    .bind(create.refresh_token)
    .bind(create.token_expires_at)
    .bind(settings)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

async fn patch_account(
    pool: &SqlitePool,
    id: i64,
    patch: AccountPatch,
) -> Result<(), SignpostError> {
    let settings = patch
        .settings
        .map(|s| serde_json::to_string(&s))
        .transpose()?;

    let result = sqlx::query(
        r#"
    UPDATE accounts SET
        access_token = COALESCE(?, access_token),
        refresh_token = COALESCE(?, refresh_token),
        token_expires_at = COALESCE(?, token_expires_at),
        is_active = COALESCE(?, is_active),
        last_sync = COALESCE(?, last_sync),
        settings = COALESCE(?, settings),
        updated_at = ?
    WHERE id = ?
    "#,
    )
    .bind(patch.access_token)
    .bind(patch.refresh_token)
    .bind(patch.token_expires_at)
    .bind(patch.is_active)
    .bind(patch.last_sync)
    .bind(settings)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(SignpostError::NotFound(format!("account {id}")));
    }
    Ok(())
}

const ACCOUNT_COLUMNS: &str = "id, user_id, label, google_account_name, is_active, \
    access_token, refresh_token, token_expires_at, settings, last_sync, created_at, updated_at";

async fn get_account(pool: &SqlitePool, id: i64) -> Result<DbAccount, SignpostError> {
    sqlx::query_as::<_, DbAccount>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| SignpostError::NotFound(format!("account {id}")))
}

async fn get_owned_account(
    pool: &SqlitePool,
    id: i64,
    user_id: &str,
) -> Result<DbAccount, SignpostError> {
    sqlx::query_as::<_, DbAccount>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ? AND user_id = ?"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| SignpostError::NotFound(format!("account {id}")))
}

async fn list_active_accounts(pool: &SqlitePool) -> Result<Vec<DbAccount>, SignpostError> {
    let rows = sqlx::query_as::<_, DbAccount>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE is_active = 1 ORDER BY id"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

async fn list_accounts_for_user(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Vec<DbAccount>, SignpostError> {
    let rows = sqlx::query_as::<_, DbAccount>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = ? ORDER BY id"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

async fn upsert_location(
    pool: &SqlitePool,
    upsert: crate::db::patch::LocationUpsert,
) -> Result<i64, SignpostError> {
    let id: i64 = sqlx::query_scalar(
        r#"
    INSERT INTO locations (account_id, resource_name, title, payload, updated_at)
    VALUES (?, ?, ?, ?, ?)
    ON CONFLICT(resource_name) DO UPDATE SET
        account_id=excluded.account_id,
        title=excluded.title,
        payload=excluded.payload,
        updated_at=excluded.updated_at
    RETURNING id
    "#,
    )
    .bind(upsert.account_id)
    .bind(upsert.resource_name)
    .bind(upsert.title)
    .bind(upsert.payload)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(id)
}

async fn list_locations(
    pool: &SqlitePool,
    account_id: i64,
) -> Result<Vec<DbLocation>, SignpostError> {
    let rows = sqlx::query_as::<_, DbLocation>(
        r#"
    SELECT id, account_id, resource_name, title, payload, updated_at
    FROM locations
    WHERE account_id = ?
    ORDER BY id
    "#,
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

async fn replace_snapshots(
    pool: &SqlitePool,
    batch: SnapshotBatch,
) -> Result<usize, SignpostError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    // The pull is the source of truth for this (location, kind): rows the
    // provider no longer returns are gone remotely and must go locally too.
    sqlx::query("DELETE FROM remote_snapshots WHERE location_id = ? AND kind = ?")
        .bind(batch.location_id)
        .bind(batch.kind)
        .execute(&mut *tx)
        .await?;

    let mut written = 0usize;
    for item in batch.items {
        sqlx::query(
            r#"
        INSERT INTO remote_snapshots (location_id, kind, resource_name, payload, fetched_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(location_id, kind, resource_name) DO UPDATE SET
            payload=excluded.payload,
            fetched_at=excluded.fetched_at
        "#,
        )
        .bind(batch.location_id)
        .bind(batch.kind)
        .bind(&item.resource_name)
        .bind(&item.payload)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        written += 1;
    }

    tx.commit().await?;
    Ok(written)
}

async fn create_publishable(
    pool: &SqlitePool,
    create: PublishableCreate,
) -> Result<i64, SignpostError> {
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        r#"
    INSERT INTO publishables (
        account_id, location_id, kind, status, body, target_resource,
        provider_resource_id, error_message, created_at, updated_at
    )
    VALUES (?, ?, ?, 'draft', ?, ?, NULL, NULL, ?, ?)
    RETURNING id
    "#,
    )
    .bind(create.account_id)
    .bind(create.location_id)
    .bind(create.kind)
    .bind(create.body)
    .bind(create.target_resource)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

async fn get_publishable(pool: &SqlitePool, id: i64) -> Result<DbPublishable, SignpostError> {
    sqlx::query_as::<_, DbPublishable>(
        r#"
    SELECT id, account_id, location_id, kind, status, body, target_resource,
           provider_resource_id, error_message, created_at, updated_at
    FROM publishables
    WHERE id = ?
    "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| SignpostError::NotFound(format!("publishable {id}")))
}

async fn patch_publishable(
    pool: &SqlitePool,
    id: i64,
    patch: PublishablePatch,
) -> Result<(), SignpostError> {
    // A terminal flip to `pending`/`published` must not keep failure text
    // from an earlier attempt, so those transitions write the (usually
    // NULL) incoming message instead of coalescing with the stored one.
    let result = sqlx::query(
        r#"
    UPDATE publishables SET
        status = COALESCE(?1, status),
        provider_resource_id = COALESCE(?2, provider_resource_id),
        error_message = CASE
            WHEN ?1 IN ('pending', 'published') THEN ?3
            ELSE COALESCE(?3, error_message)
        END,
        updated_at = ?4
    WHERE id = ?5
    "#,
    )
    .bind(patch.status)
    .bind(patch.provider_resource_id)
    .bind(patch.error_message)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(SignpostError::NotFound(format!("publishable {id}")));
    }
    Ok(())
}

async fn append_action_log(
    pool: &SqlitePool,
    action: &str,
    status: &str,
    details: &Value,
) -> Result<(), SignpostError> {
    sqlx::query(
        r#"
    INSERT INTO action_log (action, status, details, created_at)
    VALUES (?, ?, ?, ?)
    "#,
    )
    .bind(action)
    .bind(status)
    .bind(details.to_string())
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

async fn list_action_log(
    pool: &SqlitePool,
    limit: i64,
) -> Result<Vec<DbActionLogEntry>, SignpostError> {
    let rows = sqlx::query_as::<_, DbActionLogEntry>(
        r#"
    SELECT id, action, status, details, created_at
    FROM action_log
    ORDER BY id DESC
    LIMIT ?
    "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Spawn the database actor and return a cloneable handle.
pub async fn spawn(database_url: &str) -> DbHandle {
    // Unnamed: the process may host several pools (one per test database).
    let (actor, _jh) = ractor::Actor::spawn(None, DbActor, database_url.to_string())
        .await
        .expect("failed to spawn DbActor");

    DbHandle { actor }
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), SignpostError> {
    for stmt in SQLITE_INIT.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(pool).await?;
    }
    Ok(())
}
