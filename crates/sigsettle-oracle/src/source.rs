//! Price source abstraction.

use async_trait::async_trait;
use rust_decimal::Decimal;

use sigsettle_core::{normalize_symbol, AssetClass, Price};

use crate::error::OracleResult;

/// What to price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    /// Normalized symbol.
    pub symbol: String,
    /// Lowercased token contract address, when known.
    pub address: Option<String>,
    pub class: AssetClass,
}

impl AssetRef {
    /// Build a reference, classifying the symbol by static lookup.
    pub fn new(symbol: &str, address: Option<&str>) -> Self {
        let symbol = normalize_symbol(symbol);
        Self {
            class: AssetClass::classify(&symbol),
            address: address
                .map(|a| a.trim().to_ascii_lowercase())
                .filter(|a| !a.is_empty()),
            symbol,
        }
    }

    /// Override the asset class (e.g. a provider tagged the signal as a stock).
    #[must_use]
    pub fn with_class(mut self, class: AssetClass) -> Self {
        self.class = class;
        self
    }

    /// Cache key: the address when known, else the symbol.
    pub fn cache_key(&self) -> String {
        match &self.address {
            Some(addr) => addr.clone(),
            None => self.symbol.clone(),
        }
    }
}

/// Raw price returned by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPrice {
    pub price: Price,
    pub change_24h_pct: Option<Decimal>,
}

/// One upstream data source.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Source name for logs, metrics and `PriceQuote::source`.
    fn name(&self) -> &'static str;

    /// Fetch the current USD price.
    async fn fetch(&self, asset: &AssetRef) -> OracleResult<FetchedPrice>;
}
