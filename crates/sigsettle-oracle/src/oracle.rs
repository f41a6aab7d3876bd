//! Price oracle: source routing, caching, stale fallback and fetch coalescing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use sigsettle_core::{normalize_symbol, Clock, PriceQuote, SystemClock};
use sigsettle_telemetry::Metrics;

use crate::cache::{InMemoryQuoteCache, QuoteCache};
use crate::config::OracleConfig;
use crate::error::{OracleError, OracleResult};
use crate::source::{AssetRef, PriceSource};
use crate::sources::{CoinGeckoSource, DexScreenerSource, YahooFinanceSource};

/// Consumer-facing price lookup. Lookups never fail: `None` means no usable price.
#[async_trait]
pub trait PriceLookup: Send + Sync {
    /// Price a fully described asset.
    async fn quote(&self, asset: &AssetRef) -> Option<PriceQuote>;

    /// Price a symbol, optionally pinned to a token contract address.
    async fn get_price(&self, symbol: &str, address: Option<&str>) -> Option<PriceQuote> {
        self.quote(&AssetRef::new(symbol, address)).await
    }

    /// Price many symbols concurrently, one request per unique normalized symbol.
    ///
    /// Symbols without a usable price are absent from the result.
    async fn get_prices(&self, symbols: &[String]) -> HashMap<String, PriceQuote> {
        let mut unique: Vec<String> = symbols.iter().map(|s| normalize_symbol(s)).collect();
        unique.sort();
        unique.dedup();

        let lookups = unique.into_iter().map(|symbol| async move {
            let quote = self.get_price(&symbol, None).await;
            (symbol, quote)
        });

        join_all(lookups)
            .await
            .into_iter()
            .filter_map(|(symbol, quote)| quote.map(|q| (symbol, q)))
            .collect()
    }
}

/// Price oracle adapter over two source chains.
pub struct PriceOracle {
    crypto: Vec<Arc<dyn PriceSource>>,
    traditional: Vec<Arc<dyn PriceSource>>,
    cache: Arc<dyn QuoteCache>,
    inflight: DashMap<String, Arc<Mutex<()>>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    timeout: Duration,
}

impl PriceOracle {
    /// Build the oracle with the HTTP sources and an in-memory cache.
    pub fn new(config: &OracleConfig) -> OracleResult<Self> {
        let timeout = config.timeout();
        let crypto: Vec<Arc<dyn PriceSource>> = vec![
            Arc::new(DexScreenerSource::new(&config.dexscreener_url, timeout)?),
            Arc::new(CoinGeckoSource::new(&config.coingecko_url, timeout)?),
        ];
        let traditional: Vec<Arc<dyn PriceSource>> =
            vec![Arc::new(YahooFinanceSource::new(&config.yahoo_url, timeout)?)];
        let cache = Arc::new(InMemoryQuoteCache::new(config.stale_window()));

        Ok(Self::with_sources(
            crypto,
            traditional,
            cache,
            Arc::new(SystemClock),
            config,
        ))
    }

    /// Build the oracle from explicit parts.
    pub fn with_sources(
        crypto: Vec<Arc<dyn PriceSource>>,
        traditional: Vec<Arc<dyn PriceSource>>,
        cache: Arc<dyn QuoteCache>,
        clock: Arc<dyn Clock>,
        config: &OracleConfig,
    ) -> Self {
        Self {
            crypto,
            traditional,
            cache,
            inflight: DashMap::new(),
            clock,
            ttl: config.ttl(),
            timeout: config.timeout(),
        }
    }

    /// Drop cache entries past the stale window and idle in-flight locks.
    pub fn evict_expired(&self) -> usize {
        let removed = self.cache.evict_expired(self.clock.now());
        self.inflight.retain(|_, lock| Arc::strong_count(lock) > 1);
        removed
    }

    fn chain_for(&self, asset: &AssetRef) -> &[Arc<dyn PriceSource>] {
        if asset.class.is_crypto() {
            &self.crypto
        } else {
            &self.traditional
        }
    }

    fn fresh_from_cache(&self, key: &str) -> Option<PriceQuote> {
        let now = self.clock.now();
        self.cache.get(key, now).filter(|q| q.is_fresh(now))
    }

    async fn fetch_one(
        &self,
        source: &dyn PriceSource,
        asset: &AssetRef,
    ) -> OracleResult<PriceQuote> {
        let started = Instant::now();
        let fetched = tokio::time::timeout(self.timeout, source.fetch(asset))
            .await
            .map_err(|_| OracleError::Timeout(self.timeout.as_millis() as u64))??;
        Metrics::price_fetch_latency(source.name(), started.elapsed().as_secs_f64() * 1000.0);

        Ok(PriceQuote {
            symbol: asset.symbol.clone(),
            price: fetched.price,
            change_24h_pct: fetched.change_24h_pct,
            source: source.name().to_string(),
            fetched_at: self.clock.now(),
            ttl: self.ttl,
        })
    }

    async fn fetch_through_chain(&self, asset: &AssetRef) -> Option<PriceQuote> {
        for source in self.chain_for(asset) {
            match self.fetch_one(source.as_ref(), asset).await {
                Ok(quote) => {
                    Metrics::price_fetch(source.name(), "ok");
                    debug!(
                        symbol = %asset.symbol,
                        source = source.name(),
                        price = %quote.price,
                        "Price fetched"
                    );
                    return Some(quote);
                }
                Err(e) => {
                    Metrics::price_fetch(source.name(), "error");
                    warn!(
                        symbol = %asset.symbol,
                        source = source.name(),
                        error = %e,
                        "Price source failed, trying next"
                    );
                }
            }
        }
        None
    }
}

#[async_trait]
impl PriceLookup for PriceOracle {
    async fn quote(&self, asset: &AssetRef) -> Option<PriceQuote> {
        let key = asset.cache_key();
        if let Some(quote) = self.fresh_from_cache(&key) {
            return Some(quote);
        }

        // One upstream fetch per key at a time; latecomers read the cache.
        let lock = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(quote) = self.fresh_from_cache(&key) {
            return Some(quote);
        }

        if let Some(quote) = self.fetch_through_chain(asset).await {
            self.cache.put(&key, quote.clone());
            return Some(quote);
        }

        match self.cache.get(&key, self.clock.now()) {
            Some(stale) => {
                Metrics::price_fetch(&stale.source, "stale");
                warn!(
                    symbol = %asset.symbol,
                    source = %stale.source,
                    fetched_at = %stale.fetched_at,
                    "All price sources failed, serving stale quote"
                );
                Some(stale)
            }
            None => {
                Metrics::price_fetch("none", "miss");
                warn!(symbol = %asset.symbol, class = %asset.class, "No price available");
                None
            }
        }
    }
}
