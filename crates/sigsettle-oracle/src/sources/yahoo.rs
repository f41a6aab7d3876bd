//! Yahoo Finance: market data for stocks, forex, metals, commodities and indices.
//!
//! Symbols are mapped to Yahoo tickers (`XAU` -> `GC=F`, `EURUSD` -> `EURUSD=X`,
//! `SPX` -> `^GSPC`). Stocks use their own symbol. Anything else goes through
//! the ticker search endpoint before giving up.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use sigsettle_core::{AssetClass, Price};

use crate::error::{OracleError, OracleResult};
use crate::source::{AssetRef, FetchedPrice, PriceSource};
use crate::sources::{decimal_from_f64, get_json, http_client};

const TICKERS: &[(&str, &str)] = &[
    ("XAU", "GC=F"),
    ("GOLD", "GC=F"),
    ("XAG", "SI=F"),
    ("SILVER", "SI=F"),
    ("XPT", "PL=F"),
    ("PLATINUM", "PL=F"),
    ("XPD", "PA=F"),
    ("PALLADIUM", "PA=F"),
    ("COPPER", "HG=F"),
    ("OIL", "CL=F"),
    ("WTI", "CL=F"),
    ("CRUDE", "CL=F"),
    ("BRENT", "BZ=F"),
    ("NATGAS", "NG=F"),
    ("NG", "NG=F"),
    ("WHEAT", "ZW=F"),
    ("CORN", "ZC=F"),
    ("SOYBEAN", "ZS=F"),
    ("COFFEE", "KC=F"),
    ("SUGAR", "SB=F"),
    ("SPX", "^GSPC"),
    ("NDX", "^NDX"),
    ("DJI", "^DJI"),
    ("VIX", "^VIX"),
    ("DAX", "^GDAXI"),
    ("FTSE", "^FTSE"),
    ("NIKKEI", "^N225"),
    ("HSI", "^HSI"),
    ("EUR", "EURUSD=X"),
    ("GBP", "GBPUSD=X"),
    ("AUD", "AUDUSD=X"),
    ("JPY", "JPYUSD=X"),
    ("CHF", "CHFUSD=X"),
    ("CAD", "CADUSD=X"),
];

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    chart_previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    quotes: Vec<SearchQuote>,
}

#[derive(Debug, Deserialize)]
struct SearchQuote {
    symbol: String,
}

/// Map a symbol to a Yahoo ticker, if it has a static mapping.
pub(crate) fn mapped_ticker(symbol: &str, class: AssetClass) -> Option<String> {
    if let Some((_, ticker)) = TICKERS.iter().find(|(s, _)| *s == symbol) {
        return Some((*ticker).to_string());
    }
    let listed = AssetClass::classify(symbol) == class;
    match class {
        AssetClass::Forex if listed && symbol.len() == 6 => Some(format!("{symbol}=X")),
        AssetClass::Stock | AssetClass::Index if listed => Some(symbol.to_string()),
        _ => None,
    }
}

fn parse_chart(body: ChartResponse, symbol: &str) -> OracleResult<FetchedPrice> {
    let meta = body
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .map(|r| r.meta)
        .ok_or_else(|| OracleError::NotFound(symbol.to_string()))?;
    let last = meta
        .regular_market_price
        .ok_or_else(|| OracleError::NotFound(symbol.to_string()))?;
    let price = decimal_from_f64(last, "regularMarketPrice")?;
    if price.is_sign_negative() || price.is_zero() {
        return Err(OracleError::NotFound(symbol.to_string()));
    }
    let change_24h_pct = match meta.chart_previous_close {
        Some(prev) if prev > 0.0 => {
            let prev = decimal_from_f64(prev, "chartPreviousClose")?;
            Price::new(price).pct_from(Price::new(prev))
        }
        _ => None,
    };
    Ok(FetchedPrice {
        price: Price::new(price),
        change_24h_pct,
    })
}

/// Yahoo Finance price source.
pub struct YahooFinanceSource {
    client: Client,
    base_url: String,
}

impl YahooFinanceSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> OracleResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn search_ticker(&self, symbol: &str) -> OracleResult<String> {
        let url = format!("{}/v1/finance/search", self.base_url);
        let response: SearchResponse = get_json(
            &self.client,
            &url,
            &[("q", symbol), ("quotesCount", "1"), ("newsCount", "0")],
        )
        .await?;
        let ticker = response
            .quotes
            .into_iter()
            .next()
            .map(|q| q.symbol)
            .ok_or_else(|| OracleError::NotFound(symbol.to_string()))?;
        debug!(symbol, ticker = %ticker, "Resolved Yahoo ticker via search");
        Ok(ticker)
    }
}

#[async_trait]
impl PriceSource for YahooFinanceSource {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn fetch(&self, asset: &AssetRef) -> OracleResult<FetchedPrice> {
        let ticker = match mapped_ticker(&asset.symbol, asset.class) {
            Some(t) => t,
            None => self.search_ticker(&asset.symbol).await?,
        };
        let url = format!("{}/v8/finance/chart/{}", self.base_url, ticker);
        let body: ChartResponse =
            get_json(&self.client, &url, &[("interval", "1d"), ("range", "1d")]).await?;
        parse_chart(body, &asset.symbol)
    }
}
