//! Price source implementations (DexScreener, CoinGecko, Yahoo Finance).

mod coingecko;
mod dexscreener;
mod yahoo;

pub use coingecko::CoinGeckoSource;
pub use dexscreener::DexScreenerSource;
pub use yahoo::YahooFinanceSource;

use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::error::{OracleError, OracleResult};

/// Build an HTTP client with the per-call timeout.
pub(crate) fn http_client(timeout: Duration) -> OracleResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("sigsettle/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| OracleError::HttpClient(format!("Failed to create HTTP client: {e}")))
}

/// GET a URL and decode the JSON body, treating non-2xx as an error.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    query: &[(&str, &str)],
) -> OracleResult<T> {
    trace!(url, "GET");
    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| OracleError::HttpClient(format!("HTTP request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(OracleError::HttpClient(format!("HTTP {status}: {body}")));
    }

    response
        .json()
        .await
        .map_err(|e| OracleError::Parse(format!("Failed to parse response: {e}")))
}

/// Convert an f64 from a JSON payload into a Decimal.
pub(crate) fn decimal_from_f64(value: f64, what: &str) -> OracleResult<Decimal> {
    Decimal::try_from(value).map_err(|e| OracleError::Parse(format!("{what}: {e}")))
}
