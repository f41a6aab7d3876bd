//! Store traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use sigsettle_core::{
    normalize_symbol, Signal, SignalAction, SignalId, SignalStatus, Subscription, SubscriptionId,
};

use crate::error::StoreResult;

/// Signal query. Every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SignalQuery {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub status: Option<SignalStatus>,
    #[serde(default)]
    pub action: Option<SignalAction>,
    /// Created at or after this instant.
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Entry transaction proof.
    #[serde(default)]
    pub entry_tx_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SignalQuery {
    /// Open signals of one provider and token, optionally of one action.
    pub fn open_for(provider: &str, token: &str, action: Option<SignalAction>) -> Self {
        Self {
            provider: Some(provider.to_string()),
            token: Some(token.to_string()),
            status: Some(SignalStatus::Open),
            action,
            ..Self::default()
        }
    }

    pub fn matches(&self, signal: &Signal) -> bool {
        if let Some(provider) = &self.provider {
            if !provider.eq_ignore_ascii_case(&signal.provider) {
                return false;
            }
        }
        if let Some(token) = &self.token {
            if normalize_symbol(token) != signal.token {
                return false;
            }
        }
        if let Some(status) = self.status {
            if signal.status() != status {
                return false;
            }
        }
        if let Some(action) = self.action {
            if signal.action != action {
                return false;
            }
        }
        if let Some(since) = self.since {
            if signal.created_at < since {
                return false;
            }
        }
        if let Some(tx) = &self.entry_tx_id {
            if !tx.eq_ignore_ascii_case(&signal.entry_tx_id) {
                return false;
            }
        }
        true
    }
}

/// Signal persistence. Signals are never deleted.
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Insert a new signal. Fails with `Duplicate` if the id exists.
    async fn insert(&self, signal: Signal) -> StoreResult<()>;

    /// Replace an existing signal. Fails with `NotFound` if the id is unknown.
    async fn update(&self, signal: Signal) -> StoreResult<()>;

    async fn get(&self, id: &SignalId) -> StoreResult<Option<Signal>>;

    /// Matching signals, oldest first.
    async fn query(&self, query: &SignalQuery) -> StoreResult<Vec<Signal>>;

    async fn open_signals(&self) -> StoreResult<Vec<Signal>> {
        self.query(&SignalQuery {
            status: Some(SignalStatus::Open),
            ..SignalQuery::default()
        })
        .await
    }
}

/// Result of recording one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub subscription: Subscription,
    /// This attempt deactivated the subscription.
    pub deactivated: bool,
}

/// Subscription persistence.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn insert(&self, subscription: Subscription) -> StoreResult<()>;

    async fn get(&self, id: &SubscriptionId) -> StoreResult<Option<Subscription>>;

    async fn active(&self) -> StoreResult<Vec<Subscription>>;

    /// Atomically apply a delivery result to the subscription's health counters.
    async fn record_delivery(
        &self,
        id: &SubscriptionId,
        success: bool,
        at: DateTime<Utc>,
    ) -> StoreResult<DeliveryOutcome>;
}
