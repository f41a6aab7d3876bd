//! In-memory stores backed by `DashMap`.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use sigsettle_core::{Signal, SignalId, Subscription, SubscriptionId};

use crate::error::{StoreError, StoreResult};
use crate::journal::SignalJournal;
use crate::store::{DeliveryOutcome, SignalQuery, SignalStore, SubscriptionStore};

// =============================================================================
// Signals
// =============================================================================

/// In-memory [`SignalStore`], optionally mirrored to a JSON Lines journal.
pub struct InMemorySignalStore {
    signals: DashMap<SignalId, Signal>,
    journal: Option<Mutex<SignalJournal>>,
}

impl InMemorySignalStore {
    pub fn new() -> Self {
        Self {
            signals: DashMap::new(),
            journal: None,
        }
    }

    /// Replay the journal at `path` and keep appending to it.
    pub fn with_journal(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let signals: DashMap<SignalId, Signal> = SignalJournal::replay(path)?.into_iter().collect();
        let journal = SignalJournal::open(path)?;
        info!(path = %path.display(), signals = signals.len(), "Signal store restored from journal");
        Ok(Self {
            signals,
            journal: Some(Mutex::new(journal)),
        })
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    fn journal(&self, signal: &Signal) -> StoreResult<()> {
        match &self.journal {
            Some(journal) => journal.lock().append(signal),
            None => Ok(()),
        }
    }
}

impl Default for InMemorySignalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalStore for InMemorySignalStore {
    async fn insert(&self, signal: Signal) -> StoreResult<()> {
        match self.signals.entry(signal.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(signal.id.to_string())),
            Entry::Vacant(slot) => {
                self.journal(&signal)?;
                debug!(signal_id = %signal.id, "Signal inserted");
                slot.insert(signal);
                Ok(())
            }
        }
    }

    async fn update(&self, signal: Signal) -> StoreResult<()> {
        let Some(mut existing) = self.signals.get_mut(&signal.id) else {
            return Err(StoreError::NotFound(signal.id.to_string()));
        };
        self.journal(&signal)?;
        *existing = signal;
        Ok(())
    }

    async fn get(&self, id: &SignalId) -> StoreResult<Option<Signal>> {
        Ok(self.signals.get(id).map(|s| s.value().clone()))
    }

    async fn query(&self, query: &SignalQuery) -> StoreResult<Vec<Signal>> {
        let mut found: Vec<Signal> = self
            .signals
            .iter()
            .filter(|s| query.matches(s.value()))
            .map(|s| s.value().clone())
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

/// In-memory [`SubscriptionStore`].
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    subscriptions: DashMap<SubscriptionId, Subscription>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn insert(&self, subscription: Subscription) -> StoreResult<()> {
        match self.subscriptions.entry(subscription.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(subscription.id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(subscription);
                Ok(())
            }
        }
    }

    async fn get(&self, id: &SubscriptionId) -> StoreResult<Option<Subscription>> {
        Ok(self.subscriptions.get(id).map(|s| s.value().clone()))
    }

    async fn active(&self) -> StoreResult<Vec<Subscription>> {
        let mut active: Vec<Subscription> = self
            .subscriptions
            .iter()
            .filter(|s| s.active)
            .map(|s| s.value().clone())
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(active)
    }

    async fn record_delivery(
        &self,
        id: &SubscriptionId,
        success: bool,
        at: DateTime<Utc>,
    ) -> StoreResult<DeliveryOutcome> {
        let mut entry = self
            .subscriptions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let deactivated = if success {
            entry.record_success(at);
            false
        } else {
            entry.record_failure(at)
        };
        Ok(DeliveryOutcome {
            subscription: entry.value().clone(),
            deactivated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use sigsettle_core::{
        CloseReason, OpenPosition, Price, Settlement, SignalAction, SignalState, SignalStatus,
        SubscriptionFilter, TerminalStatus,
    };
    use std::sync::Arc;

    fn signal(id: &str, provider: &str, token: &str, created_at: DateTime<Utc>) -> Signal {
        Signal {
            id: SignalId::from(id),
            provider: provider.to_string(),
            token: token.to_string(),
            token_address: None,
            chain: "base".to_string(),
            action: SignalAction::Long,
            entry_price: Price::new(dec!(2000)),
            collateral_usd: dec!(100),
            leverage: dec!(1),
            stop_loss_pct: None,
            take_profit_pct: None,
            fees_usd: Decimal::ZERO,
            slippage_pct: Decimal::ZERO,
            entry_tx_id: format!("0x{id}"),
            category: None,
            risk_level: None,
            confidence: None,
            created_at,
            expires_at: None,
            parent_signal_id: None,
            max_drawdown_pct: Decimal::ZERO,
            state: SignalState::Open(OpenPosition::default()),
        }
    }

    fn closed(mut s: Signal) -> Signal {
        s.settle(
            TerminalStatus::Closed,
            Settlement {
                exit_price: Price::new(dec!(2200)),
                exit_timestamp: Utc::now(),
                exit_tx_id: None,
                realized_pnl_pct: dec!(10),
                realized_pnl_usd: dec!(10),
                holding_duration_secs: 0,
                reason: CloseReason::Manual,
                closed_by_signal_id: None,
            },
        )
        .unwrap();
        s
    }

    #[tokio::test]
    async fn test_insert_get_update() {
        let store = InMemorySignalStore::new();
        let s = signal("sig_1", "0xp", "ETH", Utc::now());
        store.insert(s.clone()).await.unwrap();

        assert!(matches!(
            store.insert(s.clone()).await,
            Err(StoreError::Duplicate(_))
        ));

        store.update(closed(s.clone())).await.unwrap();
        let got = store.get(&s.id).await.unwrap().unwrap();
        assert_eq!(got.status(), SignalStatus::Closed);
    }

    #[tokio::test]
    async fn test_update_unknown_is_not_found() {
        let store = InMemorySignalStore::new();
        let s = signal("sig_missing", "0xp", "ETH", Utc::now());
        assert!(matches!(store.update(s).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_query_filters_and_orders_oldest_first() {
        let store = InMemorySignalStore::new();
        let t0 = Utc::now();
        store
            .insert(signal("sig_b", "0xP", "ETH", t0 + chrono::Duration::seconds(10)))
            .await
            .unwrap();
        store.insert(signal("sig_a", "0xp", "ETH", t0)).await.unwrap();
        store.insert(signal("sig_c", "0xq", "ETH", t0)).await.unwrap();
        store
            .insert(closed(signal("sig_d", "0xp", "ETH", t0)))
            .await
            .unwrap();

        let open = store
            .query(&SignalQuery::open_for("0xp", "eth", None))
            .await
            .unwrap();
        let ids: Vec<&str> = open.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["sig_a", "sig_b"]);

        assert_eq!(store.open_signals().await.unwrap().len(), 3);

        let limited = store
            .query(&SignalQuery {
                limit: Some(1),
                ..SignalQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_journal_replay_keeps_latest_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal").join("signals.jsonl");

        {
            let store = InMemorySignalStore::with_journal(&path).unwrap();
            let s = signal("sig_1", "0xp", "ETH", Utc::now());
            store.insert(s.clone()).await.unwrap();
            store.insert(signal("sig_2", "0xp", "BTC", Utc::now())).await.unwrap();
            store.update(closed(s)).await.unwrap();
        }

        let restored = InMemorySignalStore::with_journal(&path).unwrap();
        assert_eq!(restored.len(), 2);
        let s1 = restored.get(&SignalId::from("sig_1")).await.unwrap().unwrap();
        assert_eq!(s1.status(), SignalStatus::Closed);
        assert_eq!(s1.settlement().unwrap().exit_price, Price::new(dec!(2200)));
    }

    #[tokio::test]
    async fn test_journal_skips_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.jsonl");
        {
            let mut journal = SignalJournal::open(&path).unwrap();
            journal.append(&signal("sig_1", "0xp", "ETH", Utc::now())).unwrap();
        }
        // Simulate a write interrupted mid-line.
        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("{\"recorded_at_ms\": 1, \"signal\": {\"id\"");
        std::fs::write(&path, contents).unwrap();

        let replayed = SignalJournal::replay(&path).unwrap();
        assert_eq!(replayed.len(), 1);
    }

    #[tokio::test]
    async fn test_appends_after_torn_line_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.jsonl");
        {
            let store = InMemorySignalStore::with_journal(&path).unwrap();
            store.insert(signal("sig_1", "0xp", "ETH", Utc::now())).await.unwrap();
        }
        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("{\"recorded_at_ms\": 1, \"signal\": {\"id\"");
        std::fs::write(&path, contents).unwrap();

        {
            let store = InMemorySignalStore::with_journal(&path).unwrap();
            assert_eq!(store.len(), 1);
            store.insert(signal("sig_2", "0xp", "BTC", Utc::now())).await.unwrap();
        }

        let restored = InMemorySignalStore::with_journal(&path).unwrap();
        assert_eq!(restored.len(), 2);
        assert!(restored.get(&SignalId::from("sig_2")).await.unwrap().is_some());
        assert!(std::fs::read_to_string(&path).unwrap().ends_with('\n'));
    }

    #[test]
    fn test_open_leaves_clean_journal_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.jsonl");
        {
            let mut journal = SignalJournal::open(&path).unwrap();
            journal.append(&signal("sig_1", "0xp", "ETH", Utc::now())).unwrap();
        }
        let before = std::fs::read(&path).unwrap();
        drop(SignalJournal::open(&path).unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_replay_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let replayed = SignalJournal::replay(dir.path().join("absent.jsonl")).unwrap();
        assert!(replayed.is_empty());
    }

    #[tokio::test]
    async fn test_record_delivery_deactivates_at_threshold() {
        let store = InMemorySubscriptionStore::new();
        let sub = Subscription::new("http://hook", SubscriptionFilter::default()).with_max_failures(2);
        let id = sub.id.clone();
        store.insert(sub).await.unwrap();

        let first = store.record_delivery(&id, false, Utc::now()).await.unwrap();
        assert!(!first.deactivated);
        let second = store.record_delivery(&id, false, Utc::now()).await.unwrap();
        assert!(second.deactivated);
        assert!(!second.subscription.active);
        assert!(store.active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_deliveries_are_not_lost() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let sub = Subscription::new("http://hook", SubscriptionFilter::default());
        let id = sub.id.clone();
        store.insert(sub).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store.record_delivery(&id, true, Utc::now()).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let sub = store.get(&id).await.unwrap().unwrap();
        assert_eq!(sub.success_count, 50);
    }
}
