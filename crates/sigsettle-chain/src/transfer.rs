//! Token transfer events and the source abstraction.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::ChainResult;

/// One ERC-20 `Transfer` event, with the amount scaled by token decimals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTransfer {
    /// Lowercased token contract address.
    pub token_address: String,
    /// Token symbol as reported by the contract or registry.
    pub symbol: String,
    pub decimals: u8,
    /// Lowercased sender address.
    pub from: String,
    /// Lowercased recipient address.
    pub to: String,
    /// Human-unit amount (raw value / 10^decimals).
    pub amount: Decimal,
}

impl TokenTransfer {
    /// True when the trader is the sender or the recipient.
    pub fn touches(&self, address: &str) -> bool {
        self.from.eq_ignore_ascii_case(address) || self.to.eq_ignore_ascii_case(address)
    }
}

/// Fetches all token transfers emitted by a transaction.
#[async_trait]
pub trait TransferSource: Send + Sync {
    async fn token_transfers(&self, chain: &str, tx_id: &str) -> ChainResult<Vec<TokenTransfer>>;
}
