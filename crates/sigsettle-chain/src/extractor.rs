//! Trade extraction.
//!
//! Reconstructs the entry price and USD collateral of a swap from the token
//! transfers it emitted. The position's token leg is the largest transfer of
//! the claimed token (falling back to the largest non-quote transfer), the
//! quote leg is the largest stablecoin transfer (falling back to the largest
//! native/wrapped-native transfer priced through the oracle), and
//! `entry_price = quote_value_usd / token_quantity`.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use sigsettle_core::{normalize_symbol, Price};
use sigsettle_oracle::PriceLookup;
use sigsettle_telemetry::Metrics;

use crate::error::{ChainError, ChainResult};
use crate::tokens::{canonical_symbol, same_asset, TokenKind};
use crate::transfer::{TokenTransfer, TransferSource};

/// Trade economics derived from a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTrade {
    /// Symbol of the position's token leg as reported on-chain.
    pub token_symbol: String,
    pub token_address: String,
    pub token_quantity: Decimal,
    /// Symbol of the quote leg.
    pub quote_symbol: String,
    pub quote_value_usd: Decimal,
    pub entry_price: Price,
    /// USD value of the quote leg, used as the position collateral.
    pub collateral_usd: Decimal,
}

/// Derives trade economics from on-chain transfer data.
pub struct TradeExtractor {
    source: Arc<dyn TransferSource>,
    prices: Arc<dyn PriceLookup>,
    timeout: Duration,
}

impl TradeExtractor {
    pub fn new(
        source: Arc<dyn TransferSource>,
        prices: Arc<dyn PriceLookup>,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            prices,
            timeout,
        }
    }

    /// Extract the trade behind `tx_id`.
    ///
    /// `Ok(None)` means the transfers do not carry enough information to
    /// price the trade; the caller falls back to the submitted price.
    /// `Err(SymbolMismatch)` means the transaction moved a different token
    /// than the one claimed. Other errors are external-service failures.
    pub async fn extract(
        &self,
        chain: &str,
        tx_id: &str,
        claimed_symbol: &str,
        trader: Option<&str>,
    ) -> ChainResult<Option<ExtractedTrade>> {
        let result = self.extract_inner(chain, tx_id, claimed_symbol, trader).await;
        let outcome = match &result {
            Ok(Some(_)) => "ok",
            Ok(None) => "insufficient",
            Err(e) if e.is_validation() => "mismatch",
            Err(_) => "error",
        };
        Metrics::extraction(outcome);
        result
    }

    async fn extract_inner(
        &self,
        chain: &str,
        tx_id: &str,
        claimed_symbol: &str,
        trader: Option<&str>,
    ) -> ChainResult<Option<ExtractedTrade>> {
        let transfers = tokio::time::timeout(self.timeout, self.source.token_transfers(chain, tx_id))
            .await
            .map_err(|_| ChainError::Timeout(self.timeout.as_millis() as u64))??;

        let transfers = relevant_transfers(transfers, trader);
        if transfers.is_empty() {
            debug!(chain, tx_id, "No token transfers in transaction");
            return Ok(None);
        }

        let claimed = normalize_symbol(claimed_symbol);
        let Some(target) = select_target(&transfers, &claimed) else {
            debug!(chain, tx_id, claimed = %claimed, "No target token transfer");
            return Ok(None);
        };

        if !same_asset(&target.symbol, &claimed) {
            warn!(
                chain,
                tx_id,
                claimed = %claimed,
                found = %target.symbol,
                "Transaction token does not match claimed token"
            );
            return Err(ChainError::SymbolMismatch {
                claimed,
                found: target.symbol.clone(),
            });
        }

        let Some((quote, quote_value_usd)) = self.quote_leg(&transfers, target).await else {
            debug!(chain, tx_id, "No priceable quote leg");
            return Ok(None);
        };

        if target.amount.is_zero() || quote_value_usd <= Decimal::ZERO {
            return Ok(None);
        }
        let Some(entry_price) = quote_value_usd.checked_div(target.amount).map(Price::new) else {
            debug!(chain, tx_id, "Entry price out of decimal range");
            return Ok(None);
        };

        info!(
            chain,
            tx_id,
            token = %target.symbol,
            quantity = %target.amount,
            quote = %quote.symbol,
            quote_usd = %quote_value_usd,
            entry_price = %entry_price,
            "Extracted trade from transaction"
        );

        Ok(Some(ExtractedTrade {
            token_symbol: target.symbol.clone(),
            token_address: target.token_address.clone(),
            token_quantity: target.amount,
            quote_symbol: quote.symbol.clone(),
            quote_value_usd,
            entry_price,
            collateral_usd: quote_value_usd,
        }))
    }

    /// Largest stablecoin transfer, else largest native/wrapped-native transfer
    /// valued through the oracle.
    async fn quote_leg<'a>(
        &self,
        transfers: &'a [TokenTransfer],
        target: &TokenTransfer,
    ) -> Option<(&'a TokenTransfer, Decimal)> {
        let is_target = |t: &TokenTransfer| t.token_address == target.token_address;

        if let Some(stable) = largest(
            transfers
                .iter()
                .filter(|t| !is_target(t) && TokenKind::of(&t.symbol) == TokenKind::Stable),
        ) {
            return Some((stable, stable.amount));
        }

        let native = largest(
            transfers
                .iter()
                .filter(|t| !is_target(t) && TokenKind::of(&t.symbol) == TokenKind::WrappedNative),
        )?;
        let symbol = canonical_symbol(&native.symbol);
        let quote = self.prices.get_price(&symbol, None).await?;
        let value_usd = native.amount.checked_mul(quote.price.inner())?;
        Some((native, value_usd))
    }
}

/// Drop zero-value transfers; prefer those touching the trader when any do.
fn relevant_transfers(transfers: Vec<TokenTransfer>, trader: Option<&str>) -> Vec<TokenTransfer> {
    let non_zero: Vec<TokenTransfer> = transfers
        .into_iter()
        .filter(|t| t.amount > Decimal::ZERO)
        .collect();

    match trader {
        Some(addr) if non_zero.iter().any(|t| t.touches(addr)) => {
            non_zero.into_iter().filter(|t| t.touches(addr)).collect()
        }
        _ => non_zero,
    }
}

/// Largest transfer of the claimed asset (aliases included); else the largest
/// non-quote transfer.
fn select_target<'a>(transfers: &'a [TokenTransfer], claimed: &str) -> Option<&'a TokenTransfer> {
    largest(transfers.iter().filter(|t| same_asset(&t.symbol, claimed)))
        .or_else(|| largest(transfers.iter().filter(|t| !TokenKind::of(&t.symbol).is_quote())))
}

fn largest<'a>(iter: impl Iterator<Item = &'a TokenTransfer>) -> Option<&'a TokenTransfer> {
    iter.max_by(|a, b| a.amount.cmp(&b.amount))
}
