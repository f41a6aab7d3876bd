//! Quote cache.
//!
//! The oracle depends on the [`QuoteCache`] trait rather than a global map so
//! a multi-instance deployment can back it with a shared store. The in-memory
//! implementation keeps one entry per key and drops entries once they fall
//! outside the stale window.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;

use sigsettle_core::PriceQuote;

/// Key-scoped quote storage.
pub trait QuoteCache: Send + Sync {
    /// Latest quote for `key`, if it is still within the stale window at `now`.
    fn get(&self, key: &str, now: DateTime<Utc>) -> Option<PriceQuote>;

    /// Store a quote. An older quote never replaces a newer one.
    fn put(&self, key: &str, quote: PriceQuote);

    /// Remove entries older than the stale window. Returns the number removed.
    fn evict_expired(&self, now: DateTime<Utc>) -> usize;
}

/// DashMap-backed [`QuoteCache`].
pub struct InMemoryQuoteCache {
    entries: DashMap<String, PriceQuote>,
    stale_window: Duration,
}

impl InMemoryQuoteCache {
    pub fn new(stale_window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            stale_window,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn usable(&self, quote: &PriceQuote, now: DateTime<Utc>) -> bool {
        quote.age(now) < self.stale_window
    }
}

impl QuoteCache for InMemoryQuoteCache {
    fn get(&self, key: &str, now: DateTime<Utc>) -> Option<PriceQuote> {
        let quote = self.entries.get(key)?.value().clone();
        self.usable(&quote, now).then_some(quote)
    }

    fn put(&self, key: &str, quote: PriceQuote) {
        self.entries
            .entry(key.to_string())
            .and_modify(|existing| {
                if quote.fetched_at >= existing.fetched_at {
                    *existing = quote.clone();
                }
            })
            .or_insert(quote);
    }

    fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, quote| quote.age(now) < self.stale_window);
        before - self.entries.len()
    }
}
