//! Chain RPC configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// On-chain extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint per chain id (`base`, `ethereum`, ...).
    #[serde(default = "default_rpc_urls")]
    pub rpc_urls: HashMap<String, String>,
    /// Per-call timeout (ms). Default: 5000.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_rpc_urls() -> HashMap<String, String> {
    [
        ("base", "https://mainnet.base.org"),
        ("ethereum", "https://ethereum-rpc.publicnode.com"),
        ("arbitrum", "https://arb1.arbitrum.io/rpc"),
        ("optimism", "https://mainnet.optimism.io"),
        ("polygon", "https://polygon-rpc.com"),
        ("bsc", "https://bsc-dataseed.binance.org"),
    ]
    .into_iter()
    .map(|(chain, url)| (chain.to_string(), url.to_string()))
    .collect()
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_urls: default_rpc_urls(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ChainConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn rpc_url(&self, chain: &str) -> Option<&str> {
        self.rpc_urls.get(chain).map(String::as_str)
    }
}
