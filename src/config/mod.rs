mod basic;
mod google;
mod sync;

pub use basic::BasicConfig;
pub use google::GoogleConfig;
pub use sync::SyncConfig;

use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Core server configuration (see `basic` table in config.toml).
    #[serde(default)]
    pub basic: BasicConfig,

    /// Google OAuth client and API surface settings (see `google` table).
    #[serde(default)]
    pub google: GoogleConfig,

    /// Scheduler / sync fan-out tuning (see `sync` table).
    #[serde(default)]
    pub sync: SyncConfig,
}

const DEFAULT_CONFIG_FILE: &str = "config.toml";

impl Config {
    /// Builds a Figment that merges defaults and a config TOML file.
    pub fn figment() -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment.merge(Toml::file(DEFAULT_CONFIG_FILE))
        } else {
            figment
        }
    }

    /// Loads configuration from the TOML file (with defaults) and validates
    /// required fields. Missing OAuth client credentials are a
    /// `ConfigurationError`-class failure: fail fast, never at first refresh.
    pub fn from_toml() -> Self {
        if !PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            panic!("config file not found: {}", DEFAULT_CONFIG_FILE);
        }
        let cfg: Self = Self::figment().extract().unwrap_or_else(|err| {
            panic!(
                "failed to extract configuration from {}: {err}",
                DEFAULT_CONFIG_FILE
            )
        });
        if cfg.basic.cron_secret.trim().is_empty() {
            panic!("basic.cron_secret must be set and non-empty");
        }
        if cfg.google.client_id.trim().is_empty() || cfg.google.client_secret.trim().is_empty() {
            panic!("google.client_id and google.client_secret must be set and non-empty");
        }
        cfg
    }
}
