//! Notification dispatcher.
//!
//! On every committed signal transition the engine publishes a
//! [`SignalEvent`] into a bounded queue. A background task drains the queue,
//! matches active subscriptions against their filters and delivers a
//! [`WebhookPayload`] to each match in its own task, with a per-attempt
//! timeout and a fixed number of retries. Each delivery result is recorded
//! atomically as subscription health; a subscription that reaches its
//! failure threshold is deactivated for good.
//!
//! Publishing never blocks and never fails from the caller's point of view.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod payload;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::NotifyConfig;
pub use dispatcher::{
    spawn_dispatcher, DeliveryReport, DeliveryRunner, DispatcherHandle, EventSink, NullSink,
};
pub use error::{NotifyError, NotifyResult};
pub use filter::matches;
pub use payload::{EventType, SignalEvent, SignalProjection, WebhookPayload};
pub use transport::{HttpWebhookTransport, WebhookTransport};
