//! Oracle error types.
//!
//! These never escape [`crate::PriceOracle`]; they are logged and recovered
//! through the fallback chain or the stale cache.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Price not found for {0}")]
    NotFound(String),

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("Price source timed out after {0}ms")]
    Timeout(u64),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type OracleResult<T> = Result<T, OracleError>;
