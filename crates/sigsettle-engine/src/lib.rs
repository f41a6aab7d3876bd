//! Settlement engine for sigsettle.
//!
//! Owns every signal state transition:
//! - `create`: validation, on-chain extraction, sanity band, auto-pairing
//! - `evaluate` / `evaluate_open`: exit rules against live prices
//! - `close`: explicit settlement
//! - `pair_auto_close`: FIFO close of the oldest opposing signal

pub mod book;
pub mod config;
pub mod engine;
pub mod error;
pub mod locks;
pub mod pnl;
pub mod rules;

#[cfg(test)]
mod testing;

pub use book::OpenBook;
pub use config::{SanityBands, SettlementConfig};
pub use engine::{CreateOutcome, EvaluateOutcome, EvaluationSummary, SettlementEngine, SkipReason};
pub use error::{EngineError, EngineResult};
pub use locks::{SignalGuard, SignalLocks};
pub use pnl::{directional_change, Pnl, PnlError};
pub use rules::triggered_exit;
