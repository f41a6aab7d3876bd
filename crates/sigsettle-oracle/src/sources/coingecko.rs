//! CoinGecko: general crypto market-data aggregator (fallback source).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use sigsettle_core::Price;

use crate::error::{OracleError, OracleResult};
use crate::source::{AssetRef, FetchedPrice, PriceSource};
use crate::sources::{decimal_from_f64, get_json, http_client};

/// Symbol -> CoinGecko coin id for the most common assets.
const COIN_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("WBTC", "wrapped-bitcoin"),
    ("ETH", "ethereum"),
    ("WETH", "weth"),
    ("SOL", "solana"),
    ("BNB", "binancecoin"),
    ("WBNB", "wbnb"),
    ("XRP", "ripple"),
    ("ADA", "cardano"),
    ("DOGE", "dogecoin"),
    ("AVAX", "avalanche-2"),
    ("MATIC", "matic-network"),
    ("POL", "polygon-ecosystem-token"),
    ("DOT", "polkadot"),
    ("LINK", "chainlink"),
    ("UNI", "uniswap"),
    ("ARB", "arbitrum"),
    ("OP", "optimism"),
    ("ATOM", "cosmos"),
    ("LTC", "litecoin"),
    ("TRX", "tron"),
    ("TON", "the-open-network"),
    ("SUI", "sui"),
    ("APT", "aptos"),
    ("NEAR", "near"),
    ("PEPE", "pepe"),
    ("SHIB", "shiba-inu"),
    ("USDC", "usd-coin"),
    ("USDT", "tether"),
    ("DAI", "dai"),
];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    coins: Vec<SearchCoin>,
}

#[derive(Debug, Deserialize)]
struct SearchCoin {
    id: String,
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct SimplePrice {
    usd: Option<f64>,
    #[serde(default)]
    usd_24h_change: Option<f64>,
}

/// CoinGecko price source.
pub struct CoinGeckoSource {
    client: Client,
    base_url: String,
}

impl CoinGeckoSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> OracleResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Resolve a coin id: static map first, then the search endpoint.
    async fn coin_id(&self, symbol: &str) -> OracleResult<String> {
        if let Some(id) = mapped_coin_id(symbol) {
            return Ok(id.to_string());
        }
        let url = format!("{}/search", self.base_url);
        let response: SearchResponse = get_json(&self.client, &url, &[("query", symbol)]).await?;
        let id = response
            .coins
            .into_iter()
            .find(|c| c.symbol.eq_ignore_ascii_case(symbol))
            .map(|c| c.id)
            .ok_or_else(|| OracleError::NotFound(symbol.to_string()))?;
        debug!(symbol, coin_id = %id, "Resolved CoinGecko id via search");
        Ok(id)
    }
}

fn mapped_coin_id(symbol: &str) -> Option<&'static str> {
    COIN_IDS
        .iter()
        .find(|(s, _)| s.eq_ignore_ascii_case(symbol))
        .map(|(_, id)| *id)
}

fn parse_simple_price(
    body: HashMap<String, SimplePrice>,
    coin_id: &str,
    symbol: &str,
) -> OracleResult<FetchedPrice> {
    let entry = body
        .get(coin_id)
        .ok_or_else(|| OracleError::NotFound(symbol.to_string()))?;
    let usd = entry
        .usd
        .ok_or_else(|| OracleError::NotFound(symbol.to_string()))?;
    let price = decimal_from_f64(usd, "usd")?;
    if price.is_sign_negative() || price.is_zero() {
        return Err(OracleError::NotFound(symbol.to_string()));
    }
    let change_24h_pct = match entry.usd_24h_change {
        Some(v) => Some(decimal_from_f64(v, "usd_24h_change")?),
        None => None,
    };
    Ok(FetchedPrice {
        price: Price::new(price),
        change_24h_pct,
    })
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    fn name(&self) -> &'static str {
        "coingecko"
    }

    async fn fetch(&self, asset: &AssetRef) -> OracleResult<FetchedPrice> {
        let coin_id = self.coin_id(&asset.symbol).await?;
        let url = format!("{}/simple/price", self.base_url);
        let body: HashMap<String, SimplePrice> = get_json(
            &self.client,
            &url,
            &[
                ("ids", coin_id.as_str()),
                ("vs_currencies", "usd"),
                ("include_24hr_change", "true"),
            ],
        )
        .await?;
        parse_simple_price(body, &coin_id, &asset.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_mapped_coin_id() {
        assert_eq!(mapped_coin_id("eth"), Some("ethereum"));
        assert_eq!(mapped_coin_id("UNKNOWNCOIN"), None);
    }

    #[test]
    fn test_parse_simple_price() {
        let body: HashMap<String, SimplePrice> =
            serde_json::from_str(r#"{"ethereum": {"usd": 2000.5, "usd_24h_change": -2.5}}"#)
                .unwrap();
        let fetched = parse_simple_price(body, "ethereum", "ETH").unwrap();
        assert_eq!(fetched.price, Price::new(dec!(2000.5)));
        assert_eq!(fetched.change_24h_pct, Some(dec!(-2.5)));
    }

    #[test]
    fn test_parse_simple_price_missing_coin() {
        let body: HashMap<String, SimplePrice> = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            parse_simple_price(body, "ethereum", "ETH"),
            Err(OracleError::NotFound(_))
        ));
    }
}
