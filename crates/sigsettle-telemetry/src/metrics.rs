//! Prometheus metrics for sigsettle.
//!
//! Covers:
//! - Signal creation and lifecycle transitions
//! - Price oracle lookups per source
//! - On-chain extraction outcomes
//! - Webhook delivery health
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, register_int_gauge,
    CounterVec, Encoder, HistogramVec, IntCounter, IntGauge, TextEncoder,
};

use crate::error::TelemetryResult;

/// Total signals created.
/// Labels: action (BUY/SELL/LONG/SHORT)
pub static SIGNALS_CREATED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigsettle_signals_created_total",
        "Total signals created",
        &["action"]
    )
    .unwrap()
});

/// Total transitions out of OPEN.
/// Labels: status (CLOSED/EXPIRED/STOPPED), reason
pub static SIGNAL_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigsettle_signal_transitions_total",
        "Total signal transitions out of OPEN",
        &["status", "reason"]
    )
    .unwrap()
});

/// Currently open signals.
pub static OPEN_SIGNALS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("sigsettle_open_signals", "Number of open signals").unwrap()
});

/// Price fetch outcomes.
/// Labels: source, outcome (ok/error/stale/miss)
pub static PRICE_FETCH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigsettle_price_fetch_total",
        "Price lookups by source and outcome",
        &["source", "outcome"]
    )
    .unwrap()
});

/// Upstream price fetch latency in milliseconds.
pub static PRICE_FETCH_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "sigsettle_price_fetch_latency_ms",
        "Upstream price fetch latency in milliseconds",
        &["source"],
        vec![10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap()
});

/// On-chain extraction outcomes.
/// Labels: outcome (ok/insufficient/error/mismatch)
pub static EXTRACTION_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigsettle_extraction_total",
        "On-chain trade extraction outcomes",
        &["outcome"]
    )
    .unwrap()
});

/// Webhook delivery outcomes.
/// Labels: outcome (success/failure)
pub static WEBHOOK_DELIVERIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigsettle_webhook_deliveries_total",
        "Webhook delivery outcomes",
        &["outcome"]
    )
    .unwrap()
});

/// Subscriptions deactivated after reaching their failure threshold.
pub static WEBHOOK_DEACTIVATED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sigsettle_webhook_deactivated_total",
        "Subscriptions deactivated after repeated delivery failures"
    )
    .unwrap()
});

/// Events dropped because the outbound queue was full.
pub static WEBHOOK_QUEUE_DROPPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sigsettle_webhook_queue_dropped_total",
        "Notification events dropped because the outbound queue was full"
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Record a created signal.
    pub fn signal_created(action: &str) {
        SIGNALS_CREATED_TOTAL.with_label_values(&[action]).inc();
        OPEN_SIGNALS.inc();
    }

    /// Record a transition out of OPEN.
    pub fn signal_transition(status: &str, reason: &str) {
        SIGNAL_TRANSITIONS_TOTAL
            .with_label_values(&[status, reason])
            .inc();
        OPEN_SIGNALS.dec();
    }

    /// Set the open-signal gauge (e.g. after journal replay).
    pub fn open_signals_set(count: i64) {
        OPEN_SIGNALS.set(count);
    }

    /// Record a price lookup outcome.
    pub fn price_fetch(source: &str, outcome: &str) {
        PRICE_FETCH_TOTAL
            .with_label_values(&[source, outcome])
            .inc();
    }

    /// Record upstream price fetch latency.
    pub fn price_fetch_latency(source: &str, latency_ms: f64) {
        PRICE_FETCH_LATENCY_MS
            .with_label_values(&[source])
            .observe(latency_ms);
    }

    /// Record an extraction outcome.
    pub fn extraction(outcome: &str) {
        EXTRACTION_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Record a webhook delivery outcome.
    pub fn webhook_delivery(success: bool) {
        let outcome = if success { "success" } else { "failure" };
        WEBHOOK_DELIVERIES_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Record a subscription deactivation.
    pub fn webhook_deactivated() {
        WEBHOOK_DEACTIVATED_TOTAL.inc();
    }

    /// Record an event dropped at the outbound queue.
    pub fn webhook_queue_dropped() {
        WEBHOOK_QUEUE_DROPPED_TOTAL.inc();
    }

    /// Render the default registry in Prometheus text format.
    pub fn encode_text() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let families = prometheus::gather();
        let mut buf = Vec::new();
        encoder.encode(&families, &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}
