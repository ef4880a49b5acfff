//! SQL DDL for initializing the database schema.
//! SQLite-first design; can be adapted for other RDBMS.

/// SQLite schema includes:
/// - `accounts`: one connected Google identity per row (soft-deleted only)
/// - `locations`: business locations, exclusively owned by one account
/// - `remote_snapshots`: opaque JSON pulled from Google, per (location, kind)
/// - `publishables`: locally-authored posts/replies/answers bound for Google
/// - `action_log`: append-only orchestration audit trail
pub const SQLITE_INIT: &str = r#"
-- ---------------------------------------------------------------------------
-- Connected Google accounts (credential store)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    label TEXT NOT NULL,
    google_account_name TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    access_token TEXT NULL,
    refresh_token TEXT NULL,
    token_expires_at TEXT NULL, -- RFC3339
    settings TEXT NOT NULL DEFAULT '{}',
    last_sync TEXT NULL, -- RFC3339
    created_at TEXT NOT NULL, -- RFC3339
    updated_at TEXT NOT NULL, -- RFC3339
    UNIQUE(user_id, google_account_name)
);

CREATE INDEX IF NOT EXISTS idx_accounts_is_active ON accounts(is_active);
CREATE INDEX IF NOT EXISTS idx_accounts_user_id ON accounts(user_id);

-- ---------------------------------------------------------------------------
-- Business locations (account exclusively owns, no cascade on deactivate)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS locations (
    id INTEGER PRIMARY KEY NOT NULL,
    account_id INTEGER NOT NULL,
    resource_name TEXT NOT NULL UNIQUE,
    title TEXT NULL,
    payload TEXT NOT NULL,
    updated_at TEXT NOT NULL -- RFC3339
);

CREATE INDEX IF NOT EXISTS idx_locations_account_id ON locations(account_id);

-- ---------------------------------------------------------------------------
-- Pulled provider data, minimally normalized (one row per remote resource)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS remote_snapshots (
    id INTEGER PRIMARY KEY NOT NULL,
    location_id INTEGER NOT NULL,
    kind TEXT NOT NULL, -- review | post | media | metric | question
    resource_name TEXT NOT NULL,
    payload TEXT NOT NULL,
    fetched_at TEXT NOT NULL, -- RFC3339
    UNIQUE(location_id, kind, resource_name)
);

CREATE INDEX IF NOT EXISTS idx_remote_snapshots_location ON remote_snapshots(location_id, kind);

-- ---------------------------------------------------------------------------
-- Locally-authored mutations bound for Google
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS publishables (
    id INTEGER PRIMARY KEY NOT NULL,
    account_id INTEGER NOT NULL,
    location_id INTEGER NOT NULL,
    kind TEXT NOT NULL, -- post | review_reply | question_answer
    status TEXT NOT NULL DEFAULT 'draft', -- draft | pending | published | failed
    body TEXT NOT NULL,
    target_resource TEXT NOT NULL,
    provider_resource_id TEXT NULL,
    error_message TEXT NULL,
    created_at TEXT NOT NULL, -- RFC3339
    updated_at TEXT NOT NULL -- RFC3339
);

CREATE INDEX IF NOT EXISTS idx_publishables_account ON publishables(account_id, status);

-- ---------------------------------------------------------------------------
-- Append-only action log (never updated or deleted by the service)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS action_log (
    id INTEGER PRIMARY KEY NOT NULL,
    action TEXT NOT NULL,
    status TEXT NOT NULL,
    details TEXT NOT NULL,
    created_at TEXT NOT NULL -- RFC3339
);

CREATE INDEX IF NOT EXISTS idx_action_log_action ON action_log(action, created_at);
"#;

#[cfg(test)]
mod tests {
    use super::SQLITE_INIT;

    /// The init script is executed one `;`-separated fragment at a time, so a
    /// semicolon inside a comment would hand SQLite half a comment as SQL.
    #[test]
    fn init_script_splits_into_whole_statements() {
        for fragment in SQLITE_INIT.split(';') {
            let sql = fragment
                .lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n");
            let sql = sql.trim();
            if sql.is_empty() {
                continue;
            }
            assert!(
                sql.starts_with("CREATE"),
                "fragment is not a whole statement: {sql:?}"
            );
        }
    }
}
