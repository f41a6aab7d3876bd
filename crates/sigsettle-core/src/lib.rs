//! Core domain types for the sigsettle signal settlement engine.
//!
//! This crate provides the types shared by every other component:
//! - `Signal`, `SignalState`: a position and its lifecycle, tagged by status
//! - `SignalAction`, `SignalId`: trading direction and identifiers
//! - `Subscription`, `SubscriptionFilter`: webhook notification targets
//! - `Price`, `PriceQuote`, `AssetClass`: precision-safe prices and asset routing
//! - `CreateSignalInput`, `CloseSignalInput`: validated external inputs
//! - `Clock`: injectable time source

pub mod action;
pub mod asset;
pub mod clock;
pub mod decimal;
pub mod error;
pub mod signal;
pub mod subscription;
pub mod validation;

pub use action::{SignalAction, SignalId};
pub use asset::{normalize_symbol, AssetClass, PriceQuote};
pub use clock::{Clock, ManualClock, SystemClock};
pub use decimal::Price;
pub use error::{CoreError, Result, ValidationError};
pub use signal::{
    CloseReason, OpenPosition, RiskLevel, Settlement, Signal, SignalState, SignalStatus,
    TerminalStatus,
};
pub use subscription::{Subscription, SubscriptionFilter, SubscriptionId};
pub use validation::{
    price_in_range, usd_amount_in_range, CloseSignalInput, CreateSignalInput, ValidCloseInput,
    ValidCreateInput,
};
