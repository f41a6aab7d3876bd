//! Application wiring and lifecycle.
//!
//! ```text
//! HTTP ──► SettlementEngine ──► SignalStore (journal)
//!   ▲            │   ▲
//!   │            │   └── PriceOracle ◄── poll loop
//!   │            ▼
//!   │      DispatcherHandle ──► DeliveryRunner ──► webhooks
//!   └── TradeExtractor (EVM JSON-RPC)
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sigsettle_chain::{EvmRpcTransferSource, TradeExtractor};
use sigsettle_core::{Clock, SystemClock};
use sigsettle_engine::SettlementEngine;
use sigsettle_notify::{spawn_dispatcher, DeliveryRunner, HttpWebhookTransport};
use sigsettle_oracle::{PriceLookup, PriceOracle};
use sigsettle_store::{InMemorySignalStore, InMemorySubscriptionStore, SignalStore, SubscriptionStore};

use crate::api::{create_router, AppState};
use crate::config::AppConfig;
use crate::error::AppResult;

/// Grace period for in-flight webhook deliveries at shutdown.
const DISPATCHER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Application {
    config: AppConfig,
    engine: Arc<SettlementEngine>,
    oracle: Arc<PriceOracle>,
    dispatcher_task: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl Application {
    /// Build every component and restore state from the journal.
    pub async fn build(config: AppConfig) -> AppResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let oracle = Arc::new(PriceOracle::new(&config.oracle)?);

        let signals: Arc<dyn SignalStore> = match config
            .store
            .journal_path
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
        {
            Some(path) => Arc::new(InMemorySignalStore::with_journal(path)?),
            None => {
                warn!("No journal configured, signals will not survive a restart");
                Arc::new(InMemorySignalStore::new())
            }
        };

        let subscriptions = Arc::new(InMemorySubscriptionStore::new());
        for sub in &config.subscriptions {
            let subscription = sub.to_subscription();
            info!(
                subscription_id = %subscription.id,
                endpoint = %subscription.endpoint,
                "Registered webhook subscription"
            );
            subscriptions.insert(subscription).await?;
        }

        let transport = Arc::new(HttpWebhookTransport::new(config.notify.timeout())?);
        let runner = DeliveryRunner::new(
            subscriptions,
            transport,
            clock.clone(),
            config.notify.clone(),
        );
        let (dispatcher, dispatcher_task) = spawn_dispatcher(runner);

        let prices: Arc<dyn PriceLookup> = oracle.clone();
        let mut engine = SettlementEngine::new(
            signals,
            prices.clone(),
            Arc::new(dispatcher),
            clock,
            config.settlement.clone(),
        );
        if config.server.extraction_enabled {
            let source = EvmRpcTransferSource::new(config.chain.clone())?;
            let extractor = TradeExtractor::new(Arc::new(source), prices, config.chain.timeout());
            engine = engine.with_extractor(Arc::new(extractor));
            info!(chains = config.chain.rpc_urls.len(), "On-chain trade extraction enabled");
        }
        let open = engine.restore().await?;
        info!(open, "Application initialized");

        Ok(Self {
            config,
            engine: Arc::new(engine),
            oracle,
            dispatcher_task,
            shutdown: CancellationToken::new(),
        })
    }

    /// Serve HTTP until Ctrl-C, then drain background tasks.
    pub async fn run(self) -> AppResult<()> {
        let Self {
            config,
            engine,
            oracle,
            dispatcher_task,
            shutdown,
        } = self;

        let poll_task = if config.server.poll_enabled {
            Some(tokio::spawn(run_poll_loop(
                engine.clone(),
                oracle,
                config.settlement.poll_interval(),
                config.settlement.batch_concurrency,
                shutdown.clone(),
            )))
        } else {
            None
        };

        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
            signal_token.cancel();
        });

        let addr = config.bind_addr()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "Starting HTTP server");

        let router = create_router(AppState::new(engine.clone()));
        let serve_token = shutdown.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { serve_token.cancelled().await })
            .await?;

        // Server stopped on its own: make sure the loop stops too.
        shutdown.cancel();
        if let Some(task) = poll_task {
            if let Err(e) = task.await {
                warn!(error = %e, "Poll loop ended abnormally");
            }
        }

        // The dispatcher exits once the last engine handle is gone.
        drop(engine);
        match tokio::time::timeout(DISPATCHER_DRAIN_TIMEOUT, dispatcher_task).await {
            Ok(_) => info!("Notification dispatcher drained"),
            Err(_) => warn!("Notification dispatcher did not drain in time"),
        }

        info!("Shutdown complete");
        Ok(())
    }
}

/// Re-evaluate every open signal each `interval` until cancelled.
pub async fn run_poll_loop(
    engine: Arc<SettlementEngine>,
    oracle: Arc<PriceOracle>,
    interval: Duration,
    concurrency: usize,
    shutdown: CancellationToken,
) {
    info!(interval_secs = interval.as_secs(), concurrency, "Price poll loop started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = engine.evaluate_open(concurrency).await {
                    warn!(error = %e, "Open signal evaluation failed");
                }
                let evicted = oracle.evict_expired();
                if evicted > 0 {
                    tracing::debug!(evicted, "Evicted expired price quotes");
                }
            }
        }
    }
    info!("Price poll loop stopped");
}
