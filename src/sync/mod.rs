//! Scheduled-synchronization engine: per-account executor and the bounded
//! fan-out that runs one scheduler pass.

mod executor;
mod pass;

pub use executor::{SyncEngine, SyncFailure, SyncReport, SyncType};
pub use pass::{AccountSyncResult, PassSummary};
