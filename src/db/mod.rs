//! Database module: models, schema, and the actor that owns the pool.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows, plus typed settings
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `patch.rs`: create/patch payloads consumed by the actor
//! - `actor.rs`: ractor actor owning the SqlitePool; all access goes
//!   through [`DbHandle`]

pub mod actor;
pub mod models;
pub mod patch;
pub mod schema;

pub use actor::{DbHandle, spawn};
pub use models::{
    AccountSettings, DbAccount, DbActionLogEntry, DbLocation, DbPublishable, PublishKind,
    PublishStatus, SnapshotKind, SyncCadence,
};
pub use patch::{
    AccountCreate, AccountPatch, LocationUpsert, PublishableCreate, PublishablePatch,
    SnapshotBatch, SnapshotUpsert,
};
pub use schema::SQLITE_INIT;
