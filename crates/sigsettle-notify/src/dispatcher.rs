//! Dispatcher actor: event queue, subscription matching and delivery.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use sigsettle_core::{Clock, Subscription};
use sigsettle_store::SubscriptionStore;
use sigsettle_telemetry::Metrics;

use crate::config::NotifyConfig;
use crate::error::NotifyError;
use crate::filter::matches;
use crate::payload::{SignalEvent, WebhookPayload};
use crate::transport::WebhookTransport;

/// Where committed signal events go.
///
/// Implementations must return immediately; delivery happens elsewhere.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: SignalEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: SignalEvent) {}
}

/// Per-event delivery summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub matched: usize,
    pub delivered: usize,
    pub failed: usize,
    pub deactivated: usize,
}

// =============================================================================
// DeliveryRunner
// =============================================================================

/// Matches subscriptions and delivers one event to each of them.
#[derive(Clone)]
pub struct DeliveryRunner {
    subscriptions: Arc<dyn SubscriptionStore>,
    transport: Arc<dyn WebhookTransport>,
    clock: Arc<dyn Clock>,
    config: NotifyConfig,
}

impl DeliveryRunner {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        transport: Arc<dyn WebhookTransport>,
        clock: Arc<dyn Clock>,
        config: NotifyConfig,
    ) -> Self {
        Self {
            subscriptions,
            transport,
            clock,
            config,
        }
    }

    /// Deliver `event` to every matching active subscription.
    ///
    /// Each delivery runs in its own task, so one slow or broken endpoint
    /// cannot hold up the others.
    pub async fn deliver_event(&self, event: &SignalEvent) -> DeliveryReport {
        let active = match self.subscriptions.active().await {
            Ok(subs) => subs,
            Err(e) => {
                error!(error = %e, "Failed to load subscriptions, event not delivered");
                return DeliveryReport::default();
            }
        };

        let matched: Vec<Subscription> = active
            .into_iter()
            .filter(|s| matches(&s.filter, &event.signal))
            .collect();
        if matched.is_empty() {
            debug!(signal_id = %event.signal.id, event = event.event_type.as_str(), "No matching subscriptions");
            return DeliveryReport::default();
        }

        let payload = Arc::new(WebhookPayload::from(event));
        let tasks: Vec<JoinHandle<(bool, bool)>> = matched
            .iter()
            .map(|sub| {
                let runner = self.clone();
                let payload = payload.clone();
                let sub = sub.clone();
                tokio::spawn(async move { runner.deliver_to(&sub, &payload).await })
            })
            .collect();

        let mut report = DeliveryReport {
            matched: matched.len(),
            ..DeliveryReport::default()
        };
        for result in join_all(tasks).await {
            match result {
                Ok((success, deactivated)) => {
                    if success {
                        report.delivered += 1;
                    } else {
                        report.failed += 1;
                    }
                    if deactivated {
                        report.deactivated += 1;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    error!(error = %e, "Webhook delivery task panicked");
                }
            }
        }

        debug!(
            signal_id = %event.signal.id,
            event = event.event_type.as_str(),
            matched = report.matched,
            delivered = report.delivered,
            failed = report.failed,
            "Event delivered"
        );
        report
    }

    /// Deliver to one subscription and record the result. Returns
    /// `(success, deactivated)`.
    async fn deliver_to(&self, sub: &Subscription, payload: &WebhookPayload) -> (bool, bool) {
        let success = self.attempt_with_retry(sub, payload).await;
        Metrics::webhook_delivery(success);

        match self
            .subscriptions
            .record_delivery(&sub.id, success, self.clock.now())
            .await
        {
            Ok(outcome) => {
                if outcome.deactivated {
                    Metrics::webhook_deactivated();
                    warn!(
                        subscription_id = %sub.id,
                        endpoint = %sub.endpoint,
                        failures = outcome.subscription.failure_count,
                        "Subscription deactivated after repeated delivery failures"
                    );
                }
                (success, outcome.deactivated)
            }
            Err(e) => {
                error!(subscription_id = %sub.id, error = %e, "Failed to record delivery result");
                (success, false)
            }
        }
    }

    async fn attempt_with_retry(&self, sub: &Subscription, payload: &WebhookPayload) -> bool {
        let attempts = self.config.max_attempts.max(1);
        for attempt in 1..=attempts {
            let result = tokio::time::timeout(
                self.config.timeout(),
                self.transport.deliver(&sub.endpoint, payload),
            )
            .await
            .unwrap_or_else(|_| Err(NotifyError::Timeout(self.config.timeout_ms)));

            match result {
                Ok(()) => return true,
                Err(e) => {
                    debug!(
                        subscription_id = %sub.id,
                        endpoint = %sub.endpoint,
                        attempt,
                        attempts,
                        error = %e,
                        "Webhook delivery attempt failed"
                    );
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.backoff()).await;
            }
        }
        false
    }
}

// =============================================================================
// Actor
// =============================================================================

/// Producer side of the dispatcher queue.
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<SignalEvent>,
}

impl EventSink for DispatcherHandle {
    fn publish(&self, event: SignalEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                Metrics::webhook_queue_dropped();
                warn!(signal_id = %event.signal.id, "Notification queue full, event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                Metrics::webhook_queue_dropped();
                warn!(signal_id = %event.signal.id, "Notification dispatcher stopped, event dropped");
            }
        }
    }
}

struct DispatcherTask {
    rx: mpsc::Receiver<SignalEvent>,
    runner: DeliveryRunner,
}

impl DispatcherTask {
    async fn run(mut self) {
        let max_in_flight = self.runner.config.max_in_flight.max(1);
        info!(max_in_flight, "Notification dispatcher started");
        let mut deliveries = JoinSet::new();
        loop {
            tokio::select! {
                // At the limit, events stay queued until a delivery finishes.
                event = self.rx.recv(), if deliveries.len() < max_in_flight => {
                    let Some(event) = event else { break };
                    let runner = self.runner.clone();
                    deliveries.spawn(async move {
                        runner.deliver_event(&event).await;
                    });
                }
                Some(_) = deliveries.join_next(), if !deliveries.is_empty() => {}
            }
        }

        if !deliveries.is_empty() {
            debug!(in_flight = deliveries.len(), "Waiting for in-flight deliveries");
        }
        while deliveries.join_next().await.is_some() {}
        info!("Notification dispatcher stopped");
    }
}

/// Spawn the dispatcher actor.
///
/// At most `max_in_flight` events are delivered concurrently; once the
/// queue behind them fills, `publish` drops new events. The task exits once every handle has been dropped and the deliveries
/// already in flight have finished.
#[must_use]
pub fn spawn_dispatcher(runner: DeliveryRunner) -> (DispatcherHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(runner.config.queue_capacity.max(1));
    let task = DispatcherTask { rx, runner };
    let join_handle = tokio::spawn(task.run());
    (DispatcherHandle { tx }, join_handle)
}
