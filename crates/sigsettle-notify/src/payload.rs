//! Signal events and webhook payloads.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sigsettle_core::{
    CloseReason, Price, RiskLevel, Signal, SignalAction, SignalId, SignalState, SignalStatus,
};

/// Webhook event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A signal was created.
    NewSignal,
    /// A signal reached a terminal state.
    PositionClosed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewSignal => "new_signal",
            Self::PositionClosed => "position_closed",
        }
    }
}

/// A committed state change, queued for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalEvent {
    pub event_type: EventType,
    /// Signal snapshot after the change.
    pub signal: Signal,
    pub at: DateTime<Utc>,
}

impl SignalEvent {
    pub fn new_signal(signal: Signal, at: DateTime<Utc>) -> Self {
        Self {
            event_type: EventType::NewSignal,
            signal,
            at,
        }
    }

    pub fn position_closed(signal: Signal, at: DateTime<Utc>) -> Self {
        Self {
            event_type: EventType::PositionClosed,
            signal,
            at,
        }
    }
}

/// Flat, subscriber-facing view of a signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalProjection {
    pub id: SignalId,
    pub provider: String,
    pub token: String,
    pub token_address: Option<String>,
    pub chain: String,
    pub action: SignalAction,
    pub status: SignalStatus,
    pub entry_price: Price,
    pub collateral_usd: Decimal,
    pub leverage: Decimal,
    pub stop_loss_pct: Option<Decimal>,
    pub take_profit_pct: Option<Decimal>,
    pub entry_tx_id: String,
    pub category: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub confidence: Option<u8>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub parent_signal_id: Option<SignalId>,
    pub max_drawdown_pct: Decimal,
    pub unrealized_pnl_pct: Option<Decimal>,
    pub exit_price: Option<Price>,
    pub exit_timestamp: Option<DateTime<Utc>>,
    pub exit_tx_id: Option<String>,
    pub pnl_pct: Option<Decimal>,
    pub pnl_usd: Option<Decimal>,
    pub close_reason: Option<CloseReason>,
    pub holding_duration_secs: Option<i64>,
}

impl From<&Signal> for SignalProjection {
    fn from(signal: &Signal) -> Self {
        let settlement = signal.settlement();
        let unrealized_pnl_pct = match &signal.state {
            SignalState::Open(p) => p.unrealized_pnl_pct,
            _ => None,
        };
        Self {
            id: signal.id.clone(),
            provider: signal.provider.clone(),
            token: signal.token.clone(),
            token_address: signal.token_address.clone(),
            chain: signal.chain.clone(),
            action: signal.action,
            status: signal.status(),
            entry_price: signal.entry_price,
            collateral_usd: signal.collateral_usd,
            leverage: signal.leverage,
            stop_loss_pct: signal.stop_loss_pct,
            take_profit_pct: signal.take_profit_pct,
            entry_tx_id: signal.entry_tx_id.clone(),
            category: signal.category.clone(),
            risk_level: signal.risk_level,
            confidence: signal.confidence,
            created_at: signal.created_at,
            expires_at: signal.expires_at,
            parent_signal_id: signal.parent_signal_id.clone(),
            max_drawdown_pct: signal.max_drawdown_pct,
            unrealized_pnl_pct,
            exit_price: settlement.map(|s| s.exit_price),
            exit_timestamp: settlement.map(|s| s.exit_timestamp),
            exit_tx_id: settlement.and_then(|s| s.exit_tx_id.clone()),
            pnl_pct: settlement.map(|s| s.realized_pnl_pct),
            pnl_usd: settlement.map(|s| s.realized_pnl_usd),
            close_reason: settlement.map(|s| s.reason),
            holding_duration_secs: settlement.map(|s| s.holding_duration_secs),
        }
    }
}

/// Body POSTed to a subscriber endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub signal: SignalProjection,
    pub timestamp: DateTime<Utc>,
}

impl From<&SignalEvent> for WebhookPayload {
    fn from(event: &SignalEvent) -> Self {
        Self {
            event_type: event.event_type,
            signal: SignalProjection::from(&event.signal),
            timestamp: event.at,
        }
    }
}
