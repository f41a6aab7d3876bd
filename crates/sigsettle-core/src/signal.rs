//! Signal: a single trading position and its lifecycle.
//!
//! The lifecycle is a tagged union keyed by status. `Open` carries the
//! live (unrealized) metrics; each terminal variant carries a `Settlement`
//! with the exit fields, so exit data exists if and only if the signal is
//! terminal. The only transition is `Open` -> one of the terminal states,
//! performed by [`Signal::settle`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::action::{SignalAction, SignalId};
use crate::decimal::Price;
use crate::error::{CoreError, Result};

/// Flat status view of [`SignalState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStatus {
    Open,
    Closed,
    Expired,
    Stopped,
}

impl SignalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
            Self::Expired => "EXPIRED",
            Self::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            "EXPIRED" => Ok(Self::Expired),
            "STOPPED" => Ok(Self::Stopped),
            other => Err(CoreError::Validation(crate::error::ValidationError::new(
                "status",
                format!("unknown status {other}"),
            ))),
        }
    }
}

/// Terminal status a signal may move into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalStatus {
    Closed,
    Expired,
    Stopped,
}

impl From<TerminalStatus> for SignalStatus {
    fn from(t: TerminalStatus) -> Self {
        match t {
            TerminalStatus::Closed => Self::Closed,
            TerminalStatus::Expired => Self::Expired,
            TerminalStatus::Stopped => Self::Stopped,
        }
    }
}

/// Why a signal left the open state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Explicit close request from the provider.
    Manual,
    TakeProfit,
    StopLoss,
    Expired,
    MaxDrawdown,
    /// Closed by an opposing signal from the same provider.
    AutoPair,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::TakeProfit => "take_profit",
            Self::StopLoss => "stop_loss",
            Self::Expired => "expired",
            Self::MaxDrawdown => "max_drawdown",
            Self::AutoPair => "auto_pair",
        }
    }

    /// Terminal status this reason settles into.
    pub fn terminal_status(&self) -> TerminalStatus {
        match self {
            Self::StopLoss | Self::MaxDrawdown => TerminalStatus::Stopped,
            Self::Expired => TerminalStatus::Expired,
            Self::Manual | Self::TakeProfit | Self::AutoPair => TerminalStatus::Closed,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-declared risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Live metrics of an open position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub unrealized_pnl_pct: Option<Decimal>,
    pub unrealized_pnl_usd: Option<Decimal>,
    pub last_price: Option<Price>,
    pub last_evaluated_at: Option<DateTime<Utc>>,
}

/// Exit fields of a terminal signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub exit_price: Price,
    pub exit_timestamp: DateTime<Utc>,
    pub exit_tx_id: Option<String>,
    /// Net of fees and slippage.
    pub realized_pnl_pct: Decimal,
    pub realized_pnl_usd: Decimal,
    pub holding_duration_secs: i64,
    pub reason: CloseReason,
    /// Signal whose arrival closed this one (auto-pair only).
    pub closed_by_signal_id: Option<SignalId>,
}

/// Lifecycle state, tagged by status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalState {
    Open(OpenPosition),
    Closed(Settlement),
    Expired(Settlement),
    Stopped(Settlement),
}

impl SignalState {
    pub fn status(&self) -> SignalStatus {
        match self {
            Self::Open(_) => SignalStatus::Open,
            Self::Closed(_) => SignalStatus::Closed,
            Self::Expired(_) => SignalStatus::Expired,
            Self::Stopped(_) => SignalStatus::Stopped,
        }
    }

    pub fn settlement(&self) -> Option<&Settlement> {
        match self {
            Self::Open(_) => None,
            Self::Closed(s) | Self::Expired(s) | Self::Stopped(s) => Some(s),
        }
    }
}

/// A single published position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    /// Address-like provider identifier.
    pub provider: String,
    /// Normalized token symbol.
    pub token: String,
    pub token_address: Option<String>,
    pub chain: String,

    pub action: SignalAction,
    pub entry_price: Price,
    pub collateral_usd: Decimal,
    pub leverage: Decimal,
    pub stop_loss_pct: Option<Decimal>,
    pub take_profit_pct: Option<Decimal>,
    pub fees_usd: Decimal,
    pub slippage_pct: Decimal,

    pub entry_tx_id: String,

    pub category: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub confidence: Option<u8>,

    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Earlier open signal this one closed through auto-pairing.
    pub parent_signal_id: Option<SignalId>,

    /// Running minimum of unrealized PnL% (never above zero).
    pub max_drawdown_pct: Decimal,

    pub state: SignalState,
}

impl Signal {
    pub fn status(&self) -> SignalStatus {
        self.state.status()
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SignalState::Open(_))
    }

    pub fn is_long(&self) -> bool {
        self.action.is_long()
    }

    pub fn open_position(&self) -> Option<&OpenPosition> {
        match &self.state {
            SignalState::Open(p) => Some(p),
            _ => None,
        }
    }

    pub fn settlement(&self) -> Option<&Settlement> {
        self.state.settlement()
    }

    /// Seconds the position has been (or was) held.
    pub fn holding_duration_secs(&self, now: DateTime<Utc>) -> i64 {
        let end = self
            .settlement()
            .map(|s| s.exit_timestamp)
            .unwrap_or(now);
        (end - self.created_at).num_seconds().max(0)
    }

    /// Record a fresh mark on an open signal.
    ///
    /// Updates unrealized metrics and the running drawdown minimum.
    pub fn mark(
        &mut self,
        price: Price,
        unrealized_pnl_pct: Decimal,
        unrealized_pnl_usd: Decimal,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let SignalState::Open(position) = &mut self.state else {
            return Err(CoreError::InvalidTransition {
                id: self.id.clone(),
                from: self.state.status(),
            });
        };
        position.unrealized_pnl_pct = Some(unrealized_pnl_pct);
        position.unrealized_pnl_usd = Some(unrealized_pnl_usd);
        position.last_price = Some(price);
        position.last_evaluated_at = Some(at);
        if unrealized_pnl_pct < self.max_drawdown_pct {
            self.max_drawdown_pct = unrealized_pnl_pct;
        }
        Ok(())
    }

    /// Move an open signal into a terminal state.
    ///
    /// Fails with `InvalidTransition` if the signal is already terminal;
    /// the signal is left untouched in that case.
    pub fn settle(&mut self, status: TerminalStatus, settlement: Settlement) -> Result<()> {
        if !self.is_open() {
            return Err(CoreError::InvalidTransition {
                id: self.id.clone(),
                from: self.status(),
            });
        }
        self.state = match status {
            TerminalStatus::Closed => SignalState::Closed(settlement),
            TerminalStatus::Expired => SignalState::Expired(settlement),
            TerminalStatus::Stopped => SignalState::Stopped(settlement),
        };
        Ok(())
    }
}
