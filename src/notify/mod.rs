//! Outbound notifications sent by rule `notify` actions.

use anyhow::Context;
use reqwest::Client;
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    fn send<'a>(
        &'a self,
        title: &'a str,
        body: &'a str,
        meta: Value,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;
}

/// Writes notifications to the log. Default when no webhook is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn send<'a>(
        &'a self,
        title: &'a str,
        body: &'a str,
        meta: Value,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            tracing::info!(title, body, meta = %meta, "notification");
            Ok(())
        })
    }
}

/// POSTs `{title, body, meta}` as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            url: url.into(),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    fn send<'a>(
        &'a self,
        title: &'a str,
        body: &'a str,
        meta: Value,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.client
                .post(&self.url)
                .json(&json!({ "title": title, "body": body, "meta": meta }))
                .send()
                .await
                .context("webhook request failed")?
                .error_for_status()
                .context("webhook rejected notification")?;
            Ok(())
        })
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub title: String,
    pub body: String,
    pub meta: Value,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    fn send<'a>(
        &'a self,
        title: &'a str,
        body: &'a str,
        meta: Value,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.sent
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(SentNotification {
                    title: title.to_string(),
                    body: body.to_string(),
                    meta,
                });
            Ok(())
        })
    }
}

/// Notifier for the configured destination.
pub fn from_config(config: &crate::config::NotificationsConfig) -> Arc<dyn Notifier> {
    match config.webhook_url.as_deref() {
        Some(url) if !url.trim().is_empty() => Arc::new(WebhookNotifier::new(url.trim())),
        _ => Arc::new(LogNotifier),
    }
}
