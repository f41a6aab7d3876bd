//! Application configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use sigsettle_chain::ChainConfig;
use sigsettle_core::subscription::DEFAULT_MAX_FAILURES;
use sigsettle_core::{Subscription, SubscriptionFilter};
use sigsettle_engine::SettlementConfig;
use sigsettle_notify::NotifyConfig;
use sigsettle_oracle::OracleConfig;

use crate::error::{AppError, AppResult};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "SIGSETTLE_CONFIG";
/// Config file used when neither `--config` nor [`CONFIG_ENV`] is set.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Top-level configuration, one section per component.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// Webhook subscriptions registered at startup.
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address. Default: 0.0.0.0:8080.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Derive entry economics from the entry transaction. Default: true.
    #[serde(default = "default_true")]
    pub extraction_enabled: bool,
    /// Run the periodic open-signal re-evaluation. Default: true.
    #[serde(default = "default_true")]
    pub poll_enabled: bool,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            extraction_enabled: true,
            poll_enabled: true,
        }
    }
}

/// Signal store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// JSON Lines journal. Signals are kept in memory only when unset.
    #[serde(default = "default_journal_path")]
    pub journal_path: Option<PathBuf>,
}

fn default_journal_path() -> Option<PathBuf> {
    Some(PathBuf::from("data/signals.jsonl"))
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            journal_path: default_journal_path(),
        }
    }
}

/// One seeded webhook subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    pub endpoint: String,
    #[serde(default)]
    pub filter: SubscriptionFilter,
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
}

fn default_max_failures() -> u32 {
    DEFAULT_MAX_FAILURES
}

impl SubscriptionConfig {
    pub fn to_subscription(&self) -> Subscription {
        Subscription::new(self.endpoint.trim(), self.filter.clone())
            .with_max_failures(self.max_failures)
    }
}

impl AppConfig {
    /// Resolve and load the configuration.
    ///
    /// Precedence: `explicit` path > `SIGSETTLE_CONFIG` > `config/default.toml`.
    /// An explicitly named file must exist; a missing default file falls
    /// back to built-in defaults.
    pub fn load(explicit: Option<String>) -> AppResult<Self> {
        let named = explicit.or_else(|| std::env::var(CONFIG_ENV).ok());
        let config = match named {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH)?,
            None => {
                warn!(path = DEFAULT_CONFIG_PATH, "Config file not found, using defaults");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    pub fn bind_addr(&self) -> AppResult<SocketAddr> {
        self.server.bind_addr.parse().map_err(|e| {
            AppError::Config(format!("Invalid server.bind_addr {:?}: {e}", self.server.bind_addr))
        })
    }

    /// Reject values the components cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        self.bind_addr()?;

        let oracle = &self.oracle;
        if oracle.ttl_secs == 0 {
            return Err(invalid("oracle.ttl_secs must be positive"));
        }
        if oracle.stale_window_secs < oracle.ttl_secs {
            return Err(invalid("oracle.stale_window_secs must be at least oracle.ttl_secs"));
        }
        if oracle.timeout_ms == 0 || self.chain.timeout_ms == 0 || self.notify.timeout_ms == 0 {
            return Err(invalid("timeouts must be positive"));
        }

        let settlement = &self.settlement;
        if settlement.max_drawdown_floor_pct >= rust_decimal::Decimal::ZERO {
            return Err(invalid("settlement.max_drawdown_floor_pct must be negative"));
        }
        if settlement.batch_concurrency == 0 {
            return Err(invalid("settlement.batch_concurrency must be positive"));
        }
        if settlement.poll_interval_secs == 0 {
            return Err(invalid("settlement.poll_interval_secs must be positive"));
        }

        if self.notify.max_attempts == 0 {
            return Err(invalid("notify.max_attempts must be positive"));
        }
        if self.notify.queue_capacity == 0 {
            return Err(invalid("notify.queue_capacity must be positive"));
        }
        if self.notify.max_in_flight == 0 {
            return Err(invalid("notify.max_in_flight must be positive"));
        }

        for sub in &self.subscriptions {
            let endpoint = sub.endpoint.trim();
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(AppError::Config(format!(
                    "subscription endpoint must be an http(s) URL: {endpoint:?}"
                )));
            }
            if sub.max_failures == 0 {
                return Err(invalid("subscription max_failures must be positive"));
            }
        }
        Ok(())
    }
}

fn invalid(message: &str) -> AppError {
    AppError::Config(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sigsettle_core::RiskLevel;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.oracle.ttl_secs, 30);
        assert_eq!(config.settlement.max_drawdown_floor_pct, dec!(-25));
        assert_eq!(config.settlement.pair_lookback_secs, 7 * 24 * 60 * 60);
        assert!(config.subscriptions.is_empty());
    }

    #[test]
    fn test_sections_and_subscriptions() {
        let config = AppConfig::from_toml(
            r#"
            [server]
            bind_addr = "127.0.0.1:9000"
            extraction_enabled = false

            [settlement]
            max_drawdown_floor_pct = "-40"
            batch_concurrency = 2

            [settlement.sanity_bands]
            forex_pct = "3"

            [store]
            journal_path = "/tmp/sigsettle/signals.jsonl"

            [[subscriptions]]
            endpoint = "https://hooks.example/eth"
            max_failures = 3

            [subscriptions.filter]
            token = "ETH"
            risk_level = "high"
            min_confidence = 70
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        assert!(!config.server.extraction_enabled);
        assert_eq!(config.settlement.max_drawdown_floor_pct, dec!(-40));
        assert_eq!(config.settlement.sanity_bands.forex_pct, dec!(3));
        assert_eq!(config.settlement.sanity_bands.crypto_pct, dec!(50));

        let sub = config.subscriptions[0].to_subscription();
        assert_eq!(sub.max_failures, 3);
        assert_eq!(sub.filter.token.as_deref(), Some("ETH"));
        assert_eq!(sub.filter.risk_level, Some(RiskLevel::High));
        assert!(sub.active);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.settlement.batch_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.oracle.stale_window_secs = 1;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.notify.max_in_flight = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.bind_addr = "not an address".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.subscriptions.push(SubscriptionConfig {
            endpoint: "ftp://nope".to_string(),
            filter: SubscriptionFilter::default(),
            max_failures: 10,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = AppConfig::load(Some(path.display().to_string())).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
