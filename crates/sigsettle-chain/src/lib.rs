//! On-chain trade extractor.
//!
//! Given a transaction id, fetches its ERC-20 transfer events and reconstructs
//! the implied entry price and collateral value of the swap.
//!
//! # Key Components
//!
//! - [`TradeExtractor`]: leg selection, alias validation, price derivation
//! - [`TransferSource`]: transfer-event source abstraction
//! - [`EvmRpcTransferSource`]: JSON-RPC receipt reader with token metadata lookup

pub mod config;
pub mod error;
pub mod extractor;
pub mod rpc;
pub mod tokens;
pub mod transfer;

pub use config::ChainConfig;
pub use error::{ChainError, ChainResult};
pub use extractor::{ExtractedTrade, TradeExtractor};
pub use rpc::EvmRpcTransferSource;
pub use tokens::{canonical_symbol, same_asset, TokenKind};
pub use transfer::{TokenTransfer, TransferSource};
