use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Delivery channel for outbound notifications. Implementations are only
/// called by the worker, after the business transaction has committed.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send(&self, event_type: &str, recipient: &str, payload: &Value) -> Result<()>;
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    event_type: &'a str,
    recipient: &'a str,
    payload: &'a Value,
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build webhook client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, event_type: &str, recipient: &str, payload: &Value) -> Result<()> {
        self.client
            .post(&self.url)
            .json(&WebhookBody {
                event_type,
                recipient,
                payload,
            })
            .send()
            .await
            .context("failed to reach notification webhook")?
            .error_for_status()
            .context("notification webhook rejected the event")?;
        Ok(())
    }
}

/// Writes notifications to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, event_type: &str, recipient: &str, payload: &Value) -> Result<()> {
        tracing::info!(
            component = "notifier",
            event_type,
            recipient,
            payload = %payload,
            "notification (log only)"
        );
        Ok(())
    }
}

pub fn from_config(webhook_url: Option<&str>) -> Result<std::sync::Arc<dyn Notifier>> {
    Ok(match webhook_url {
        Some(url) => std::sync::Arc::new(WebhookNotifier::new(url)?),
        None => std::sync::Arc::new(LogNotifier),
    })
}
