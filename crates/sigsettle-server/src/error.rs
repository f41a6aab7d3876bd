//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Oracle error: {0}")]
    Oracle(#[from] sigsettle_oracle::OracleError),

    #[error("Chain error: {0}")]
    Chain(#[from] sigsettle_chain::ChainError),

    #[error("Store error: {0}")]
    Store(#[from] sigsettle_store::StoreError),

    #[error("Notify error: {0}")]
    Notify(#[from] sigsettle_notify::NotifyError),

    #[error("Engine error: {0}")]
    Engine(#[from] sigsettle_engine::EngineError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] sigsettle_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
