//! Oracle configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Price oracle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Quote freshness window (seconds). Default: 30.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// How long an expired quote may still be served when every source fails
    /// (seconds). Default: 300.
    #[serde(default = "default_stale_window_secs")]
    pub stale_window_secs: u64,
    /// Per-source request timeout (ms). Default: 5000.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// DexScreener API base URL.
    #[serde(default = "default_dexscreener_url")]
    pub dexscreener_url: String,
    /// CoinGecko API base URL.
    #[serde(default = "default_coingecko_url")]
    pub coingecko_url: String,
    /// Yahoo Finance API base URL.
    #[serde(default = "default_yahoo_url")]
    pub yahoo_url: String,
}

fn default_ttl_secs() -> u64 {
    30
}

fn default_stale_window_secs() -> u64 {
    300
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_dexscreener_url() -> String {
    "https://api.dexscreener.com".to_string()
}

fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_yahoo_url() -> String {
    "https://query1.finance.yahoo.com".to_string()
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            stale_window_secs: default_stale_window_secs(),
            timeout_ms: default_timeout_ms(),
            dexscreener_url: default_dexscreener_url(),
            coingecko_url: default_coingecko_url(),
            yahoo_url: default_yahoo_url(),
        }
    }
}

impl OracleConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn stale_window(&self) -> Duration {
        Duration::from_secs(self.stale_window_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
