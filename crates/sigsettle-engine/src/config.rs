//! Settlement configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use sigsettle_core::AssetClass;

/// Settlement engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Running-minimum unrealized PnL% at or below which a position is
    /// stopped out. Default: -25.
    #[serde(default = "default_max_drawdown_floor_pct")]
    pub max_drawdown_floor_pct: Decimal,
    /// How far back an opposing signal may reach to auto-close (seconds).
    /// Default: 7 days.
    #[serde(default = "default_pair_lookback_secs")]
    pub pair_lookback_secs: u64,
    /// Interval of the open-signal re-evaluation loop (seconds). Default: 30.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Signals evaluated concurrently in a batch. Default: 8.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    #[serde(default)]
    pub sanity_bands: SanityBands,
}

fn default_max_drawdown_floor_pct() -> Decimal {
    dec!(-25)
}

fn default_pair_lookback_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_batch_concurrency() -> usize {
    8
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            max_drawdown_floor_pct: default_max_drawdown_floor_pct(),
            pair_lookback_secs: default_pair_lookback_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            batch_concurrency: default_batch_concurrency(),
            sanity_bands: SanityBands::default(),
        }
    }
}

impl SettlementConfig {
    pub fn pair_lookback(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.pair_lookback_secs).unwrap_or(i64::MAX / 1000))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Maximum deviation (%) between a submitted entry price and the oracle
/// price, per asset class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanityBands {
    #[serde(default = "default_crypto_band")]
    pub crypto_pct: Decimal,
    #[serde(default = "default_stock_band")]
    pub stock_pct: Decimal,
    #[serde(default = "default_forex_band")]
    pub forex_pct: Decimal,
    #[serde(default = "default_other_band")]
    pub metal_pct: Decimal,
    #[serde(default = "default_other_band")]
    pub commodity_pct: Decimal,
    #[serde(default = "default_other_band")]
    pub index_pct: Decimal,
}

fn default_crypto_band() -> Decimal {
    dec!(50)
}

fn default_stock_band() -> Decimal {
    dec!(20)
}

fn default_forex_band() -> Decimal {
    dec!(5)
}

fn default_other_band() -> Decimal {
    dec!(15)
}

impl Default for SanityBands {
    fn default() -> Self {
        Self {
            crypto_pct: default_crypto_band(),
            stock_pct: default_stock_band(),
            forex_pct: default_forex_band(),
            metal_pct: default_other_band(),
            commodity_pct: default_other_band(),
            index_pct: default_other_band(),
        }
    }
}

impl SanityBands {
    pub fn for_class(&self, class: AssetClass) -> Decimal {
        match class {
            AssetClass::Crypto => self.crypto_pct,
            AssetClass::Stock => self.stock_pct,
            AssetClass::Forex => self.forex_pct,
            AssetClass::Metal => self.metal_pct,
            AssetClass::Commodity => self.commodity_pct,
            AssetClass::Index => self.index_pct,
        }
    }
}
