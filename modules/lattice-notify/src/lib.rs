//! Outbound email dispatch for recommendation sends.
//!
//! Production posts to a mailer webhook; [`NoopMailer`] is for local runs
//! without a mailer configured.

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use lattice_recs::{Mailer, RecommendationEmail};

/// Mailer webhook backend. Posts one JSON payload per email; the webhook
/// service owns templating and delivery.
pub struct WebhookMailer {
    webhook_url: String,
    from: String,
    http: reqwest::Client,
}

impl WebhookMailer {
    pub fn new(webhook_url: String, from: String) -> Self {
        Self {
            webhook_url,
            from,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send(&self, email: &RecommendationEmail) -> anyhow::Result<()> {
        let payload = json!({
            "from": self.from,
            "to": email.to,
            "subject": email.subject,
            "is_example": email.is_example,
            "recommendations": email.items,
        });

        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "mailer webhook returned non-success");
            anyhow::bail!("mailer webhook returned {status}");
        }

        info!(to = %email.to, items = email.items.len(), "recommendation email dispatched");
        Ok(())
    }
}

/// Logs the send instead of dispatching. Used when no mailer webhook is
/// configured.
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send(&self, email: &RecommendationEmail) -> anyhow::Result<()> {
        info!(
            to = %email.to,
            subject = %email.subject,
            items = email.items.len(),
            "mailer disabled, dropping email"
        );
        Ok(())
    }
}
