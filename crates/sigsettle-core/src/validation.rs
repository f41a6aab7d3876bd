//! Declarative input validation.
//!
//! Each input type has a static table of field rules. `validate` runs the
//! table in order and converts the raw input into its typed, normalized
//! counterpart, or returns the first failing field.
//!
//! Shape and magnitude only: positivity of entry price and collateral is
//! checked by the settlement engine after on-chain enrichment, since either
//! may be derived from the transaction instead of the submission. Amounts
//! and prices are capped so that PnL arithmetic stays within the decimal
//! range for ordinary moves.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::action::{SignalAction, SignalId};
use crate::asset::normalize_symbol;
use crate::decimal::Price;
use crate::error::ValidationError;
use crate::signal::RiskLevel;

/// Maximum accepted leverage multiplier.
pub const MAX_LEVERAGE: Decimal = dec!(125);

/// Smallest accepted positive price.
pub const MIN_PRICE: Decimal = dec!(0.000000000001);

/// Largest accepted price.
pub const MAX_PRICE: Decimal = dec!(1000000000000);

/// Largest accepted collateral or fee amount in USD.
pub const MAX_USD_AMOUNT: Decimal = dec!(1000000000000);

/// Largest accepted magnitude of a PnL override, in percent.
pub const MAX_PNL_OVERRIDE_PCT: Decimal = dec!(1000000);

/// Maximum relative gap between an attested price and the requested exit price.
pub const ATTESTED_PRICE_TOLERANCE: Decimal = dec!(0.001);

/// Chain assumed when a submission does not name one.
pub const DEFAULT_CHAIN: &str = "base";

const MAX_TOKEN_LEN: usize = 20;

/// Raw create-signal submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSignalInput {
    pub provider: String,
    pub action: String,
    pub token: String,
    pub collateral_usd: Decimal,
    pub tx_id: String,
    #[serde(default)]
    pub entry_price: Option<Decimal>,
    #[serde(default)]
    pub leverage: Option<Decimal>,
    #[serde(default)]
    pub stop_loss_pct: Option<Decimal>,
    #[serde(default)]
    pub take_profit_pct: Option<Decimal>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub token_address: Option<String>,
    #[serde(default)]
    pub chain: Option<String>,
    /// Wallet that executed the transaction; defaults to the provider.
    #[serde(default)]
    pub trader_address: Option<String>,
    #[serde(default)]
    pub fees_usd: Option<Decimal>,
    #[serde(default)]
    pub slippage_pct: Option<Decimal>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub confidence: Option<u8>,
}

/// Create input after schema validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidCreateInput {
    pub provider: String,
    pub action: SignalAction,
    pub token: String,
    pub collateral_usd: Decimal,
    pub tx_id: String,
    pub entry_price: Option<Price>,
    pub leverage: Decimal,
    pub stop_loss_pct: Option<Decimal>,
    pub take_profit_pct: Option<Decimal>,
    pub expires_at: Option<DateTime<Utc>>,
    pub token_address: Option<String>,
    pub chain: String,
    pub trader_address: String,
    pub fees_usd: Decimal,
    pub slippage_pct: Decimal,
    pub category: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub confidence: Option<u8>,
}

/// Raw close-signal request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseSignalInput {
    pub signal_id: String,
    pub exit_price: Decimal,
    #[serde(default)]
    pub exit_tx_id: Option<String>,
    #[serde(default)]
    pub pnl_override: Option<Decimal>,
    /// Price embedded in the signed message, supplied by the authenticating collaborator.
    #[serde(default)]
    pub attested_price: Option<Decimal>,
}

/// Close input after schema validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidCloseInput {
    pub signal_id: SignalId,
    pub exit_price: Price,
    pub exit_tx_id: Option<String>,
    pub pnl_override: Option<Decimal>,
}

/// One named field check. Returns the failure message, if any.
struct FieldRule<T> {
    field: &'static str,
    check: fn(&T, DateTime<Utc>) -> Option<String>,
}

fn run_rules<T>(
    rules: &[FieldRule<T>],
    input: &T,
    now: DateTime<Utc>,
) -> Result<(), ValidationError> {
    for rule in rules {
        if let Some(message) = (rule.check)(input, now) {
            return Err(ValidationError::new(rule.field, message));
        }
    }
    Ok(())
}

fn blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn in_range(v: Decimal, lo: Decimal, hi: Decimal) -> bool {
    v >= lo && v <= hi
}

/// Whether `price` lies within [`MIN_PRICE`, `MAX_PRICE`].
pub fn price_in_range(price: Price) -> bool {
    in_range(price.inner(), MIN_PRICE, MAX_PRICE)
}

/// Whether `amount` lies within [0, [`MAX_USD_AMOUNT`]].
pub fn usd_amount_in_range(amount: Decimal) -> bool {
    in_range(amount, Decimal::ZERO, MAX_USD_AMOUNT)
}

fn price_range_message() -> String {
    format!("must be between {MIN_PRICE} and {MAX_PRICE}")
}

const CREATE_RULES: &[FieldRule<CreateSignalInput>] = &[
    FieldRule {
        field: "provider",
        check: |i, _| blank(&i.provider).then(|| "is required".to_string()),
    },
    FieldRule {
        field: "action",
        check: |i, _| {
            i.action
                .parse::<SignalAction>()
                .err()
                .map(|_| format!("must be one of BUY, SELL, LONG, SHORT (got {:?})", i.action))
        },
    },
    FieldRule {
        field: "token",
        check: |i, _| {
            let token = normalize_symbol(&i.token);
            if token.is_empty() {
                Some("is required".to_string())
            } else if token.len() > MAX_TOKEN_LEN {
                Some(format!("must be at most {MAX_TOKEN_LEN} characters"))
            } else if !token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_'))
            {
                Some("contains invalid characters".to_string())
            } else {
                None
            }
        },
    },
    FieldRule {
        field: "txId",
        check: |i, _| blank(&i.tx_id).then(|| "is required".to_string()),
    },
    FieldRule {
        field: "collateralUsd",
        check: |i, _| {
            (!usd_amount_in_range(i.collateral_usd))
                .then(|| format!("must be between 0 and {MAX_USD_AMOUNT}"))
        },
    },
    FieldRule {
        field: "entryPrice",
        check: |i, _| match i.entry_price {
            Some(p) if p.is_sign_negative() => Some("must not be negative".to_string()),
            Some(p) if !p.is_zero() && !price_in_range(Price::new(p)) => Some(price_range_message()),
            _ => None,
        },
    },
    FieldRule {
        field: "leverage",
        check: |i, _| match i.leverage {
            Some(l) if !in_range(l, Decimal::ONE, MAX_LEVERAGE) => {
                Some(format!("must be between 1 and {MAX_LEVERAGE}"))
            }
            _ => None,
        },
    },
    FieldRule {
        field: "stopLossPct",
        check: |i, _| match i.stop_loss_pct {
            Some(v) if v <= Decimal::ZERO || v > Decimal::ONE_HUNDRED => {
                Some("must be in (0, 100]".to_string())
            }
            _ => None,
        },
    },
    FieldRule {
        field: "takeProfitPct",
        check: |i, _| match i.take_profit_pct {
            Some(v) if v <= Decimal::ZERO => Some("must be positive".to_string()),
            _ => None,
        },
    },
    FieldRule {
        field: "expiresAt",
        check: |i, now| match i.expires_at {
            Some(at) if at <= now => Some("must be in the future".to_string()),
            _ => None,
        },
    },
    FieldRule {
        field: "feesUsd",
        check: |i, _| match i.fees_usd {
            Some(v) if !usd_amount_in_range(v) => {
                Some(format!("must be between 0 and {MAX_USD_AMOUNT}"))
            }
            _ => None,
        },
    },
    FieldRule {
        field: "slippagePct",
        check: |i, _| match i.slippage_pct {
            Some(v) if !in_range(v, Decimal::ZERO, dec!(50)) => {
                Some("must be between 0 and 50".to_string())
            }
            _ => None,
        },
    },
    FieldRule {
        field: "confidence",
        check: |i, _| match i.confidence {
            Some(c) if c > 100 => Some("must be between 0 and 100".to_string()),
            _ => None,
        },
    },
];

const CLOSE_RULES: &[FieldRule<CloseSignalInput>] = &[
    FieldRule {
        field: "signalId",
        check: |i, _| blank(&i.signal_id).then(|| "is required".to_string()),
    },
    FieldRule {
        field: "exitPrice",
        check: |i, _| (!price_in_range(Price::new(i.exit_price))).then(price_range_message),
    },
    FieldRule {
        field: "pnlOverride",
        check: |i, _| match i.pnl_override {
            Some(v) if v.abs() > MAX_PNL_OVERRIDE_PCT => {
                Some(format!("must be within ±{MAX_PNL_OVERRIDE_PCT}"))
            }
            _ => None,
        },
    },
    FieldRule {
        field: "attestedPrice",
        check: |i, _| {
            let attested = i.attested_price?;
            let exit = Price::new(i.exit_price);
            match Price::new(attested).deviation_from(exit) {
                Some(dev) if dev <= ATTESTED_PRICE_TOLERANCE => None,
                _ => Some(format!(
                    "{attested} differs from exitPrice {} by more than 0.1%",
                    i.exit_price
                )),
            }
        },
    },
];

impl CreateSignalInput {
    /// Validate and normalize the submission.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<ValidCreateInput, ValidationError> {
        run_rules(CREATE_RULES, self, now)?;

        let action = self
            .action
            .parse::<SignalAction>()
            .map_err(|e| ValidationError::new("action", e.to_string()))?;
        let provider = self.provider.trim().to_string();
        let trader_address = self
            .trader_address
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(provider.as_str())
            .to_string();

        Ok(ValidCreateInput {
            action,
            token: normalize_symbol(&self.token),
            collateral_usd: self.collateral_usd,
            tx_id: self.tx_id.trim().to_string(),
            entry_price: self.entry_price.map(Price::new),
            leverage: self.leverage.unwrap_or(Decimal::ONE),
            stop_loss_pct: self.stop_loss_pct,
            take_profit_pct: self.take_profit_pct,
            expires_at: self.expires_at,
            token_address: self
                .token_address
                .as_deref()
                .map(|a| a.trim().to_ascii_lowercase())
                .filter(|a| !a.is_empty()),
            chain: self
                .chain
                .as_deref()
                .map(|c| c.trim().to_ascii_lowercase())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_CHAIN.to_string()),
            trader_address,
            fees_usd: self.fees_usd.unwrap_or(Decimal::ZERO),
            slippage_pct: self.slippage_pct.unwrap_or(Decimal::ZERO),
            category: self
                .category
                .as_deref()
                .map(|c| c.trim().to_ascii_lowercase())
                .filter(|c| !c.is_empty()),
            risk_level: self.risk_level,
            confidence: self.confidence,
            provider,
        })
    }
}

impl CloseSignalInput {
    /// Validate the close request, including the attested-price tolerance.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<ValidCloseInput, ValidationError> {
        run_rules(CLOSE_RULES, self, now)?;
        Ok(ValidCloseInput {
            signal_id: SignalId::from_string(self.signal_id.trim().to_string()),
            exit_price: Price::new(self.exit_price),
            exit_tx_id: self
                .exit_tx_id
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            pnl_override: self.pnl_override,
        })
    }
}
