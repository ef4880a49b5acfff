use serde::{Deserialize, Serialize};

/// Scheduler-pass and sync fan-out tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Max accounts synced concurrently during a scheduler pass.
    /// TOML: `sync.worker_limit`. Default: `4`.
    #[serde(default = "default_worker_limit")]
    pub worker_limit: usize,

    /// Outbound Google API requests per second across a scheduler pass.
    /// Shared external rate limits make this a per-process budget, not a
    /// per-account one. TOML: `sync.api_tps`. Default: `10`.
    #[serde(default = "default_api_tps")]
    pub api_tps: usize,

    /// Minimum minutes between two automatic syncs of the same hourly
    /// account; suppresses duplicate work when the external trigger fires
    /// more often than hourly. TOML: `sync.min_interval_minutes`.
    /// Default: `30`.
    #[serde(default = "default_min_interval_minutes")]
    pub min_interval_minutes: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            worker_limit: default_worker_limit(),
            api_tps: default_api_tps(),
            min_interval_minutes: default_min_interval_minutes(),
        }
    }
}

fn default_worker_limit() -> usize {
    4
}

fn default_api_tps() -> usize {
    10
}

fn default_min_interval_minutes() -> i64 {
    30
}
