//! Exit rules for open positions.
//!
//! Rules are checked in a fixed order and the first that fires wins:
//! stop-loss, take-profit, expiry, max-drawdown.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use sigsettle_core::{CloseReason, Signal};

/// First exit rule triggered by an unrealized PnL of `pnl_pct` at `now`.
///
/// Stop-loss fires only on a loss: `pnl_pct < 0 && |pnl_pct| >= stop_loss_pct`.
/// `floor_pct` is the drawdown floor (negative, in percent). The running
/// minimum is taken over the stored minimum and the current mark.
pub fn triggered_exit(
    signal: &Signal,
    pnl_pct: Decimal,
    now: DateTime<Utc>,
    floor_pct: Decimal,
) -> Option<CloseReason> {
    if let Some(stop) = signal.stop_loss_pct {
        // Only losses can stop a position out.
        if pnl_pct < Decimal::ZERO && -pnl_pct >= stop {
            return Some(CloseReason::StopLoss);
        }
    }
    if let Some(target) = signal.take_profit_pct {
        if pnl_pct >= target {
            return Some(CloseReason::TakeProfit);
        }
    }
    if let Some(expires_at) = signal.expires_at {
        if now >= expires_at {
            return Some(CloseReason::Expired);
        }
    }
    let running_min = signal.max_drawdown_pct.min(pnl_pct);
    if running_min <= floor_pct {
        return Some(CloseReason::MaxDrawdown);
    }
    None
}
