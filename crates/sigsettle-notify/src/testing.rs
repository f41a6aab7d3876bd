//! Shared test fixtures.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sigsettle_core::{OpenPosition, Price, Signal, SignalAction, SignalId, SignalState};

pub(crate) fn sample_signal() -> Signal {
    Signal {
        id: SignalId::from("sig_notify"),
        provider: "0xprovider".to_string(),
        token: "ETH".to_string(),
        token_address: None,
        chain: "base".to_string(),
        action: SignalAction::Long,
        entry_price: Price::new(dec!(2000)),
        collateral_usd: dec!(100),
        leverage: dec!(5),
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
