use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use referral_core::RetryPolicy;
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "REFERRAL_";

/// Settings for the `referral` binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Ledger file location.
    pub store: PathBuf,
    /// How long to wait for another process to release the ledger file.
    pub lock_timeout_ms: u64,
    /// Retry policy applied to referral triggers.
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: PathBuf::from("referrals.json"),
            lock_timeout_ms: 2_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Defaults, then the TOML file (if present), then `REFERRAL_*` env vars.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load(path: &Path, store_override: Option<PathBuf>) -> eyre::Result<Self> {
        let mut config: Config = Self::figment(path).extract()?;
        if let Some(store) = store_override {
            config.store = store;
        }
        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }
}
