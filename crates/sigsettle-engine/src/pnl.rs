//! Position PnL arithmetic.
//!
//! All values are exact decimals. Percentages are expressed in percent
//! (50 = +50%), USD values in dollars.

use rust_decimal::Decimal;
use thiserror::Error;

use sigsettle_core::{Price, Signal};

/// Why a PnL figure could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PnlError {
    #[error("entry price is zero")]
    ZeroEntry,
    #[error("PnL exceeds the representable decimal range")]
    Overflow,
}

/// A PnL figure in both units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pnl {
    pub pct: Decimal,
    pub usd: Decimal,
}

/// Fractional price change in the position's favour.
///
/// Long: `(current - entry) / entry`. Short: `(entry - current) / entry`.
/// `None` when the entry price is zero or the change is out of range.
#[inline]
pub fn directional_change(is_long: bool, entry: Price, current: Price) -> Option<Decimal> {
    let change = current.change_from(entry)?;
    Some(if is_long { change } else { -change })
}

/// Mark-to-market PnL before costs.
pub fn unrealized(signal: &Signal, current: Price) -> Result<Pnl, PnlError> {
    if signal.entry_price.is_zero() {
        return Err(PnlError::ZeroEntry);
    }
    let change = directional_change(signal.is_long(), signal.entry_price, current)
        .ok_or(PnlError::Overflow)?;
    let levered = checked(change.checked_mul(signal.leverage))?;
    Ok(Pnl {
        pct: checked(levered.checked_mul(Decimal::ONE_HUNDRED))?.normalize(),
        usd: checked(signal.collateral_usd.checked_mul(levered))?.normalize(),
    })
}

/// PnL at exit, net of fees and slippage.
///
/// `pct_override` replaces the computed percentage; the USD figure then
/// follows as `collateral * pct / 100` with costs already assumed inside the
/// supplied figure.
pub fn realized(signal: &Signal, exit: Price, pct_override: Option<Decimal>) -> Result<Pnl, PnlError> {
    if let Some(pct) = pct_override {
        return Ok(Pnl {
            pct,
            usd: percent_of(signal.collateral_usd, pct)?.normalize(),
        });
    }

    let gross = unrealized(signal, exit)?;
    let slippage_usd = percent_of(signal.collateral_usd, signal.slippage_pct)?;
    let usd = checked(
        gross
            .usd
            .checked_sub(signal.fees_usd)
            .and_then(|v| v.checked_sub(slippage_usd)),
    )?;
    let pct = if signal.collateral_usd.is_zero() {
        gross.pct
    } else {
        checked(
            usd.checked_div(signal.collateral_usd)
                .and_then(|v| v.checked_mul(Decimal::ONE_HUNDRED)),
        )?
    };
    Ok(Pnl {
        pct: pct.normalize(),
        usd: usd.normalize(),
    })
}

fn percent_of(amount: Decimal, pct: Decimal) -> Result<Decimal, PnlError> {
    checked(amount.checked_mul(pct).and_then(|v| v.checked_div(Decimal::ONE_HUNDRED)))
}

#[inline]
fn checked(value: Option<Decimal>) -> Result<Decimal, PnlError> {
    value.ok_or(PnlError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::open_signal;
    use rust_decimal_macros::dec;
    use sigsettle_core::SignalAction;

    #[test]
    fn test_long_unrealized() {
        let signal = open_signal(SignalAction::Long, dec!(2000), dec!(100), dec!(5));
        let pnl = unrealized(&signal, Price::new(dec!(2200))).unwrap();
        assert_eq!(pnl.pct, dec!(50));
        assert_eq!(pnl.usd, dec!(50));
    }

    #[test]
    fn test_short_unrealized() {
        let signal = open_signal(SignalAction::Short, dec!(100), dec!(100), dec!(2));
        let pnl = unrealized(&signal, Price::new(dec!(90))).unwrap();
        assert_eq!(pnl.pct, dec!(20));
        assert_eq!(pnl.usd, dec!(20));

        let against = unrealized(&signal, Price::new(dec!(110))).unwrap();
        assert_eq!(against.pct, dec!(-20));
    }

    #[test]
    fn test_sell_is_short_side() {
        let signal = open_signal(SignalAction::Sell, dec!(100), dec!(50), dec!(1));
        let pnl = unrealized(&signal, Price::new(dec!(95))).unwrap();
        assert_eq!(pnl.pct, dec!(5));
        assert_eq!(pnl.usd, dec!(2.5));
    }

    #[test]
    fn test_realized_nets_costs() {
        let mut signal = open_signal(SignalAction::Long, dec!(2000), dec!(100), dec!(5));
        signal.fees_usd = dec!(2);
        signal.slippage_pct = dec!(1);

        let pnl = realized(&signal, Price::new(dec!(2200)), None).unwrap();
        // 50 gross - 2 fees - 1 slippage
        assert_eq!(pnl.usd, dec!(47));
        assert_eq!(pnl.pct, dec!(47));
    }

    #[test]
    fn test_realized_override() {
        let signal = open_signal(SignalAction::Long, dec!(2000), dec!(250), dec!(5));
        let pnl = realized(&signal, Price::new(dec!(1)), Some(dec!(12))).unwrap();
        assert_eq!(pnl.pct, dec!(12));
        assert_eq!(pnl.usd, dec!(30));
    }

    #[test]
    fn test_zero_entry_has_no_pnl() {
        let signal = open_signal(SignalAction::Long, Decimal::ZERO, dec!(100), dec!(1));
        assert_eq!(unrealized(&signal, Price::new(dec!(1))), Err(PnlError::ZeroEntry));
    }

    #[test]
    fn test_overflow_is_an_error() {
        let signal = open_signal(
            SignalAction::Long,
            dec!(0.0000000001),
            dec!(1000000000000000),
            dec!(100),
        );
        let exit = Price::new(dec!(1000000));
        assert_eq!(unrealized(&signal, exit), Err(PnlError::Overflow));
        assert_eq!(realized(&signal, exit, None), Err(PnlError::Overflow));
    }
}
