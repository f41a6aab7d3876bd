//! Engine error taxonomy.
//!
//! These are the errors a caller of the settlement engine can observe.
//! External-service failures during price lookup or extraction are recovered
//! inside the engine and only surface when no fallback is left.

use thiserror::Error;

use sigsettle_core::{SignalId, SignalStatus, ValidationError};
use sigsettle_store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Signal {id} is {status}, not OPEN")]
    StateConflict { id: SignalId, status: SignalStatus },

    #[error("Signal not found: {0}")]
    NotFound(SignalId),

    #[error("External service unavailable: {0}")]
    ExternalService(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::StateConflict { .. } => "state_conflict",
            Self::NotFound(_) => "not_found",
            Self::ExternalService(_) => "external_service_error",
            Self::Store(_) => "store_error",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
