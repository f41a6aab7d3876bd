use chrono::Utc;
use rust_decimal::Decimal;

use sigsettle_core::{OpenPosition, Price, Signal, SignalAction, SignalId, SignalState};

pub(crate) fn open_signal(
    action: SignalAction,
    entry: Decimal,
    collateral: Decimal,
    leverage: Decimal,
) -> Signal {
    Signal {
        id: SignalId::new(),
        provider: "0xprovider".to_string(),
        token: "ETH".to_string(),
        token_address: None,
        chain: "base".to_string(),
        action,
        entry_price: Price::new(entry),
        collateral_usd: collateral,
        leverage,
        stop_loss_pct: None,
        take_profit_pct: None,
        fees_usd: Decimal::ZERO,
        slippage_pct: Decimal::ZERO,
        entry_tx_id: "0xentry".to_string(),
        category: None,
        risk_level: None,
        confidence: None,
        created_at: Utc::now(),
        expires_at: None,
        parent_signal_id: None,
        max_drawdown_pct: Decimal::ZERO,
        state: SignalState::Open(OpenPosition::default()),
    }
}
