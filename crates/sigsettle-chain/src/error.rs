//! Chain error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Token mismatch: claimed {claimed}, transaction moved {found}")]
    SymbolMismatch { claimed: String, found: String },

    #[error("No RPC endpoint configured for chain {0}")]
    UnsupportedChain(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Extraction timed out after {0}ms")]
    Timeout(u64),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChainError {
    /// True for errors the caller must surface as validation failures rather
    /// than recover from.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::SymbolMismatch { .. })
    }
}

pub type ChainResult<T> = Result<T, ChainError>;
