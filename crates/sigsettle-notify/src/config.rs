//! Dispatcher configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Webhook delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Per-attempt delivery timeout (ms). Default: 5000.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Attempts per delivery before it counts as one failure. Default: 3.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay between attempts (ms). Default: 500.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Outbound event queue capacity. Default: 1024.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Events being delivered at once. Further events wait in the queue.
    /// Default: 64.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_max_in_flight() -> usize {
    64
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            queue_capacity: default_queue_capacity(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl NotifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}
