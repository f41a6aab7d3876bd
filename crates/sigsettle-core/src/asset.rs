//! Asset classification and price quotes.
//!
//! The asset class decides which data-source chain the oracle consults.
//! Classification is a static lookup: anything not listed as a stock,
//! forex pair, metal, commodity or index is treated as crypto.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::decimal::Price;

const STOCKS: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "GOOG", "AMZN", "META", "TSLA", "NVDA", "AMD", "INTC", "NFLX",
    "COIN", "MSTR", "PLTR", "BABA", "DIS", "JPM", "BAC", "V", "MA", "WMT", "HOOD", "ORCL",
    "CRM", "UBER", "SHOP", "PYPL", "SQ", "NKE", "KO", "PEP", "MCD", "XOM", "CVX",
];

const FOREX: &[&str] = &[
    "EURUSD", "GBPUSD", "USDJPY", "USDCHF", "AUDUSD", "USDCAD", "NZDUSD", "EURGBP", "EURJPY",
    "GBPJPY", "USDCNH", "USDINR", "USDMXN", "USDTRY", "EUR", "GBP", "JPY", "CHF", "AUD", "CAD",
];

const METALS: &[&str] = &["XAU", "XAG", "XPT", "XPD", "GOLD", "SILVER", "PLATINUM", "PALLADIUM", "COPPER"];

const COMMODITIES: &[&str] = &["OIL", "WTI", "BRENT", "CRUDE", "NATGAS", "NG", "WHEAT", "CORN", "SOYBEAN", "COFFEE", "SUGAR"];

const INDICES: &[&str] = &["SPX", "SPY", "NDX", "QQQ", "DJI", "DIA", "IWM", "VIX", "DAX", "FTSE", "NIKKEI", "HSI"];

/// Asset class used to route price lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Crypto,
    Stock,
    Forex,
    Metal,
    Commodity,
    Index,
}

impl AssetClass {
    /// Classify a symbol by static lookup.
    pub fn classify(symbol: &str) -> Self {
        let key = normalize_symbol(symbol);
        let key = key.as_str();
        if METALS.contains(&key) {
            Self::Metal
        } else if COMMODITIES.contains(&key) {
            Self::Commodity
        } else if INDICES.contains(&key) {
            Self::Index
        } else if FOREX.contains(&key) {
            Self::Forex
        } else if STOCKS.contains(&key) {
            Self::Stock
        } else {
            Self::Crypto
        }
    }

    pub fn is_crypto(&self) -> bool {
        *self == Self::Crypto
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crypto => "crypto",
            Self::Stock => "stock",
            Self::Forex => "forex",
            Self::Metal => "metal",
            Self::Commodity => "commodity",
            Self::Index => "index",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a symbol for lookup and cache keys.
///
/// Uppercases, trims, drops a leading `$` and a quote suffix after `/`, `-`
/// or `:` (`ETH/USDT` -> `ETH`).
pub fn normalize_symbol(symbol: &str) -> String {
    let s = symbol.trim().trim_start_matches('$').to_ascii_uppercase();
    for sep in ['/', '-', ':'] {
        if let Some((base, _quote)) = s.split_once(sep) {
            if !base.is_empty() {
                return base.to_string();
            }
        }
    }
    s
}

/// A fetched price. Ephemeral: cached for a short TTL, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Normalized symbol (or token address for address lookups).
    pub symbol: String,
    pub price: Price,
    /// 24h change in percent, when the source reports it.
    pub change_24h_pct: Option<Decimal>,
    /// Name of the data source that produced the quote.
    pub source: String,
    pub fetched_at: DateTime<Utc>,
    /// Freshness window for this quote.
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
}

impl PriceQuote {
    /// Age of the quote at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.age(now) < self.ttl
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_classify() {
        assert_eq!(AssetClass::classify("ETH"), AssetClass::Crypto);
        assert_eq!(AssetClass::classify("pepe"), AssetClass::Crypto);
        assert_eq!(AssetClass::classify("AAPL"), AssetClass::Stock);
        assert_eq!(AssetClass::classify("eurusd"), AssetClass::Forex);
        assert_eq!(AssetClass::classify("XAU"), AssetClass::Metal);
        assert_eq!(AssetClass::classify("WTI"), AssetClass::Commodity);
        assert_eq!(AssetClass::classify("SPX"), AssetClass::Index);
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol(" eth "), "ETH");
        assert_eq!(normalize_symbol("$pepe"), "PEPE");
        assert_eq!(normalize_symbol("ETH/USDT"), "ETH");
        assert_eq!(normalize_symbol("BTC-USD"), "BTC");
    }

    #[test]
    fn test_quote_freshness() {
        let now = Utc::now();
        let quote = PriceQuote {
            symbol: "ETH".to_string(),
            price: Price::new(dec!(2000)),
            change_24h_pct: None,
            source: "test".to_string(),
            fetched_at: now - chrono::Duration::seconds(10),
            ttl: Duration::from_secs(30),
        };
        assert!(quote.is_fresh(now));
        assert!(!quote.is_fresh(now + chrono::Duration::seconds(25)));
    }
}
