//! Notification sink for approval requests
//!
//! One notification is published per gated run. The message body carries
//! the allow/deny callback URLs with the approval token embedded; decision
//! delivery comes back through `WorkflowEngine::resume`, not through this
//! client.

use crate::config::ApprovalConfig;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::json;

/// Sink that alerts a human that a run is waiting for a decision
#[async_trait]
pub trait ApprovalNotifier: Send + Sync {
    async fn notify(&self, subject: &str, body: &str) -> Result<()>;
}

/// Webhook-backed notifier posting a JSON message to a configured endpoint
pub struct WebhookNotifier {
    webhook_url: String,
    http_client: HttpClient,
}

impl WebhookNotifier {
    pub fn new(config: &ApprovalConfig) -> Self {
        let http_client = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            webhook_url: config.webhook_url.clone(),
            http_client,
        }
    }
}

#[async_trait]
impl ApprovalNotifier for WebhookNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<()> {
        let payload = json!({
            "subject": subject,
            "message": body,
        });

        let response = self
            .http_client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::Transient(format!(
                "Notification webhook returned {} - {}",
                status, error_text
            )));
        }

        log::info!("Published approval notification: {}", subject);
        Ok(())
    }
}
