//! Open-signal index for auto-pairing.
//!
//! Open signals are queued per (provider, token, action) in creation order,
//! so the oldest opposing signal is found without scanning the store.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use sigsettle_core::{Signal, SignalAction, SignalId};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BookKey {
    provider: String,
    token: String,
    action: SignalAction,
}

impl BookKey {
    fn new(provider: &str, token: &str, action: SignalAction) -> Self {
        Self {
            provider: provider.to_ascii_lowercase(),
            token: token.to_string(),
            action,
        }
    }

    fn of(signal: &Signal) -> Self {
        Self::new(&signal.provider, &signal.token, signal.action)
    }
}

#[derive(Debug, Clone)]
struct BookEntry {
    id: SignalId,
    opened_at: DateTime<Utc>,
}

/// FIFO queues of open signals.
#[derive(Default)]
pub struct OpenBook {
    queues: DashMap<BookKey, VecDeque<BookEntry>>,
}

impl OpenBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the book from the currently open signals.
    pub fn from_signals<'a>(signals: impl IntoIterator<Item = &'a Signal>) -> Self {
        let book = Self::new();
        let mut open: Vec<&Signal> = signals.into_iter().filter(|s| s.is_open()).collect();
        open.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        for signal in open {
            book.insert(signal);
        }
        book
    }

    /// Queue an open signal, keeping creation order.
    pub fn insert(&self, signal: &Signal) {
        let entry = BookEntry {
            id: signal.id.clone(),
            opened_at: signal.created_at,
        };
        let mut queue = self.queues.entry(BookKey::of(signal)).or_default();
        let pos = queue
            .iter()
            .rposition(|e| e.opened_at <= entry.opened_at)
            .map_or(0, |p| p + 1);
        queue.insert(pos, entry);
    }

    /// Remove a signal that left the OPEN state.
    pub fn remove(&self, signal: &Signal) -> bool {
        let key = BookKey::of(signal);
        let Some(mut queue) = self.queues.get_mut(&key) else {
            return false;
        };
        let Some(pos) = queue.iter().position(|e| e.id == signal.id) else {
            return false;
        };
        queue.remove(pos);
        let empty = queue.is_empty();
        drop(queue);
        if empty {
            self.queues.remove_if(&key, |_, q| q.is_empty());
        }
        true
    }

    /// Oldest open signal of `provider`/`token` with one of `actions`,
    /// opened at or after `since`. Ties go to the earlier action in `actions`.
    pub fn oldest_opposing(
        &self,
        provider: &str,
        token: &str,
        actions: &[SignalAction],
        since: DateTime<Utc>,
    ) -> Option<SignalId> {
        actions
            .iter()
            .filter_map(|&action| {
                let queue = self.queues.get(&BookKey::new(provider, token, action))?;
                queue
                    .iter()
                    .find(|e| e.opened_at >= since)
                    .map(|e| (e.opened_at, e.id.clone()))
            })
            .min_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, id)| id)
    }

    /// Number of open signals indexed.
    pub fn len(&self) -> usize {
        self.queues.iter().map(|q| q.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::open_signal;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn at(action: SignalAction, created_at: DateTime<Utc>) -> Signal {
        let mut s = open_signal(action, dec!(100), dec!(100), dec!(1));
        s.created_at = created_at;
        s
    }

    #[test]
    fn test_oldest_across_actions() {
        let t0 = Utc::now();
        let buy = at(SignalAction::Buy, t0 + Duration::seconds(5));
        let long = at(SignalAction::Long, t0);
        let book = OpenBook::from_signals([&buy, &long]);

        let found = book.oldest_opposing("0xPROVIDER", "ETH", SignalAction::Sell.closes(), t0);
        assert_eq!(found, Some(long.id.clone()));

        assert!(book.remove(&long));
        let found = book.oldest_opposing("0xprovider", "ETH", SignalAction::Sell.closes(), t0);
        assert_eq!(found, Some(buy.id));
    }

    #[test]
    fn test_lookback_excludes_old_entries() {
        let t0 = Utc::now();
        let old = at(SignalAction::Long, t0 - Duration::days(8));
        let recent = at(SignalAction::Long, t0 - Duration::days(1));
        let book = OpenBook::from_signals([&old, &recent]);

        let since = t0 - Duration::days(7);
        let found = book.oldest_opposing("0xprovider", "ETH", &[SignalAction::Long], since);
        assert_eq!(found, Some(recent.id));
    }

    #[test]
    fn test_other_token_or_provider_never_matches() {
        let t0 = Utc::now();
        let mut other_token = at(SignalAction::Long, t0);
        other_token.token = "BTC".to_string();
        let mut other_provider = at(SignalAction::Long, t0);
        other_provider.provider = "0xsomeone".to_string();
        let book = OpenBook::from_signals([&other_token, &other_provider]);

        assert_eq!(book.oldest_opposing("0xprovider", "ETH", &[SignalAction::Long], t0), None);
        assert_eq!(book.len(), 2);
    }

    #[test]
    fn test_out_of_order_insert_keeps_fifo() {
        let t0 = Utc::now();
        let book = OpenBook::new();
        let late = at(SignalAction::Long, t0 + Duration::seconds(10));
        let early = at(SignalAction::Long, t0);
        book.insert(&late);
        book.insert(&early);

        let found = book.oldest_opposing("0xprovider", "ETH", &[SignalAction::Long], t0);
        assert_eq!(found, Some(early.id));
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let book = OpenBook::new();
        let s = at(SignalAction::Long, Utc::now());
        assert!(!book.remove(&s));
        assert!(book.is_empty());
    }
}
