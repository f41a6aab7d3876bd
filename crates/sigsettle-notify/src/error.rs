//! Notification error types.
//!
//! Delivery errors are recorded as subscription health and never reach the
//! code that triggered the event.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Endpoint returned HTTP {status}")]
    Status { status: u16 },

    #[error("Delivery timed out after {0}ms")]
    Timeout(u64),

    #[error("Store error: {0}")]
    Store(#[from] sigsettle_store::StoreError),
}

pub type NotifyResult<T> = Result<T, NotifyError>;
