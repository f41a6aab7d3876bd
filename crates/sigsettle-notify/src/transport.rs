//! Webhook transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{NotifyError, NotifyResult};
use crate::payload::WebhookPayload;

/// Delivers one payload to one endpoint.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn deliver(&self, endpoint: &str, payload: &WebhookPayload) -> NotifyResult<()>;
}

/// JSON-over-HTTP POST transport. Any non-2xx response is a failure.
pub struct HttpWebhookTransport {
    client: Client,
}

impl HttpWebhookTransport {
    pub fn new(timeout: Duration) -> NotifyResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sigsettle-webhook/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NotifyError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for HttpWebhookTransport {
    async fn deliver(&self, endpoint: &str, payload: &WebhookPayload) -> NotifyResult<()> {
        let response = self
            .client
            .post(endpoint)
            .header("X-Sigsettle-Event", payload.event_type.as_str())
            .json(payload)
            .send()
            .await
            .map_err(|e| NotifyError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
