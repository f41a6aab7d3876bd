//! Webhook subscription records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::signal::RiskLevel;

/// Default consecutive failures before a subscription is deactivated.
pub const DEFAULT_MAX_FAILURES: u32 = 10;

/// Unique subscription identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(format!("sub_{}", Uuid::new_v4().simple()))
    }

    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Optional filters, AND-combined. An absent filter always passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub min_confidence: Option<u8>,
    #[serde(default)]
    pub min_collateral_usd: Option<Decimal>,
}

/// A notification target and its delivery health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub endpoint: String,
    pub filter: SubscriptionFilter,
    pub active: bool,
    pub success_count: u64,
    /// Consecutive failures since the last success.
    pub failure_count: u32,
    pub max_failures: u32,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(endpoint: impl Into<String>, filter: SubscriptionFilter) -> Self {
        Self {
            id: SubscriptionId::new(),
            endpoint: endpoint.into(),
            filter,
            active: true,
            success_count: 0,
            failure_count: 0,
            max_failures: DEFAULT_MAX_FAILURES,
            last_triggered_at: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    /// Record a successful delivery: resets the failure streak.
    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.success_count += 1;
        self.failure_count = 0;
        self.last_triggered_at = Some(at);
    }

    /// Record a failed delivery.
    ///
    /// Returns `true` if this failure deactivated the subscription. Once
    /// inactive, a subscription is never reactivated here.
    pub fn record_failure(&mut self, at: DateTime<Utc>) -> bool {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_triggered_at = Some(at);
        if self.active && self.failure_count >= self.max_failures {
            self.active = false;
            return true;
        }
        false
    }
}
