//! Price oracle adapter.
//!
//! Classifies a symbol into an asset class and fetches its USD price from a
//! prioritized chain of data sources:
//!
//! - crypto: DEX liquidity aggregator first, general market-data aggregator second
//! - stocks, forex, metals, commodities, indices: market-data API by mapped
//!   ticker, with a ticker search for unmapped symbols
//!
//! Every lookup goes through a TTL cache keyed by normalized symbol (or token
//! address). A lookup never fails: when every source errors the last cached
//! quote is returned if still within the stale window, otherwise `None`.
//!
//! # Key Components
//!
//! - [`PriceOracle`]: the adapter
//! - [`PriceLookup`]: the consumer-facing trait (implemented by `PriceOracle`)
//! - [`PriceSource`]: one upstream data source
//! - [`QuoteCache`] / [`InMemoryQuoteCache`]: injected cache abstraction

pub mod cache;
pub mod config;
pub mod error;
pub mod oracle;
pub mod source;
pub mod sources;

pub use cache::{InMemoryQuoteCache, QuoteCache};
pub use config::OracleConfig;
pub use error::{OracleError, OracleResult};
pub use oracle::{PriceLookup, PriceOracle};
pub use source::{AssetRef, FetchedPrice, PriceSource};
pub use sources::{CoinGeckoSource, DexScreenerSource, YahooFinanceSource};
