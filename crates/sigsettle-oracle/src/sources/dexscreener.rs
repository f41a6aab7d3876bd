//! DexScreener: DEX liquidity aggregator.
//!
//! Preferred for newly listed and low-cap tokens that general market-data
//! aggregators do not list yet. Among all pairs for the token, the pair with
//! the deepest USD liquidity sets the price.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use sigsettle_core::Price;

use crate::error::{OracleError, OracleResult};
use crate::source::{AssetRef, FetchedPrice, PriceSource};
use crate::sources::{decimal_from_f64, get_json, http_client};

#[derive(Debug, Deserialize)]
struct PairsResponse {
    #[serde(default)]
    pairs: Option<Vec<Pair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pair {
    base_token: PairToken,
    #[serde(default)]
    price_usd: Option<String>,
    #[serde(default)]
    liquidity: Option<Liquidity>,
    #[serde(default)]
    price_change: Option<PriceChange>,
}

#[derive(Debug, Deserialize)]
struct PairToken {
    address: String,
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct Liquidity {
    #[serde(default)]
    usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PriceChange {
    #[serde(default)]
    h24: Option<f64>,
}

/// DexScreener price source.
pub struct DexScreenerSource {
    client: Client,
    base_url: String,
}

impl DexScreenerSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> OracleResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn pairs(&self, asset: &AssetRef) -> OracleResult<Vec<Pair>> {
        let response: PairsResponse = match &asset.address {
            Some(address) => {
                let url = format!("{}/latest/dex/tokens/{}", self.base_url, address);
                get_json(&self.client, &url, &[]).await?
            }
            None => {
                let url = format!("{}/latest/dex/search", self.base_url);
                get_json(&self.client, &url, &[("q", asset.symbol.as_str())]).await?
            }
        };
        Ok(response.pairs.unwrap_or_default())
    }
}

/// Select the deepest-liquidity pair whose base token matches the asset.
fn select_pair(pairs: Vec<Pair>, asset: &AssetRef) -> Option<Pair> {
    pairs
        .into_iter()
        .filter(|p| match &asset.address {
            Some(addr) => p.base_token.address.eq_ignore_ascii_case(addr),
            None => p.base_token.symbol.eq_ignore_ascii_case(&asset.symbol),
        })
        .filter(|p| p.price_usd.is_some())
        .max_by(|a, b| {
            let la = a.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
            let lb = b.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
            la.total_cmp(&lb)
        })
}

fn to_fetched(pair: Pair, asset: &AssetRef) -> OracleResult<FetchedPrice> {
    let raw = pair
        .price_usd
        .ok_or_else(|| OracleError::NotFound(asset.symbol.clone()))?;
    let price = Decimal::from_str(&raw)
        .map_err(|e| OracleError::Parse(format!("priceUsd {raw:?}: {e}")))?;
    if price <= Decimal::ZERO {
        return Err(OracleError::NotFound(asset.symbol.clone()));
    }
    let change_24h_pct = match pair.price_change.and_then(|c| c.h24) {
        Some(v) => Some(decimal_from_f64(v, "priceChange.h24")?),
        None => None,
    };
    Ok(FetchedPrice {
        price: Price::new(price),
        change_24h_pct,
    })
}

#[async_trait]
impl PriceSource for DexScreenerSource {
    fn name(&self) -> &'static str {
        "dexscreener"
    }

    async fn fetch(&self, asset: &AssetRef) -> OracleResult<FetchedPrice> {
        let pairs = self.pairs(asset).await?;
        let pair =
            select_pair(pairs, asset).ok_or_else(|| OracleError::NotFound(asset.symbol.clone()))?;
        to_fetched(pair, asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SEARCH_BODY: &str = r#"{
        "pairs": [
            {"baseToken": {"address": "0xaaa", "symbol": "PEPE"}, "priceUsd": "0.0000011",
             "liquidity": {"usd": 5000.0}, "priceChange": {"h24": 3.5}},
            {"baseToken": {"address": "0xbbb", "symbol": "PEPE"}, "priceUsd": "0.0000012",
             "liquidity": {"usd": 900000.0}, "priceChange": {"h24": -1.25}},
            {"baseToken": {"address": "0xccc", "symbol": "PEPE2"}, "priceUsd": "5.0",
             "liquidity": {"usd": 99999999.0}}
        ]
    }"#;

    #[test]
    fn test_select_deepest_matching_pair() {
        let response: PairsResponse = serde_json::from_str(SEARCH_BODY).unwrap();
        let asset = AssetRef::new("pepe", None);
        let pair = select_pair(response.pairs.unwrap(), &asset).unwrap();
        assert_eq!(pair.base_token.address, "0xbbb");

        let fetched = to_fetched(pair, &asset).unwrap();
        assert_eq!(fetched.price, Price::new(dec!(0.0000012)));
        assert_eq!(fetched.change_24h_pct, Some(dec!(-1.25)));
    }

    #[test]
    fn test_select_by_address() {
        let response: PairsResponse = serde_json::from_str(SEARCH_BODY).unwrap();
        let asset = AssetRef::new("pepe", Some("0xAAA"));
        let pair = select_pair(response.pairs.unwrap(), &asset).unwrap();
        assert_eq!(pair.base_token.address, "0xaaa");
    }

    #[test]
    fn test_null_pairs_is_not_found() {
        let response: PairsResponse = serde_json::from_str(r#"{"pairs": null}"#).unwrap();
        let asset = AssetRef::new("NOPE", None);
        assert!(select_pair(response.pairs.unwrap_or_default(), &asset).is_none());
    }
}
