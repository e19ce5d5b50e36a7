//! Notification Channels
//! =====================
//! Sink interfaces for the three delivery channels plus the outbound
//! webhook implementations. SMTP and chat-service specifics live behind
//! the interfaces; in-memory sinks back development and tests.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use crate::detect::Severity;
use crate::error::{PipelineError, PipelineResult};

/// Email delivery capability
#[async_trait]
pub trait EmailSink: Send + Sync {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: Option<&str>,
    ) -> PipelineResult<()>;
}

/// Chat (Slack-style) delivery capability
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send(
        &self,
        message: &str,
        severity: Severity,
        attachments: Option<Value>,
    ) -> PipelineResult<()>;
}

/// Raw webhook delivery capability
#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn post(&self, payload: &Value, headers: Option<&[(String, String)]>)
        -> PipelineResult<()>;
}

/// Webhook sink POSTing JSON to each configured URL. Delivery succeeds if
/// any endpoint accepts the payload.
pub struct HttpWebhookSink {
    urls: Vec<String>,
    client: reqwest::Client,
}

impl HttpWebhookSink {
    pub fn new(urls: Vec<String>, timeout: Duration) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Notification(e.to_string()))?;
        Ok(Self { urls, client })
    }
}

#[async_trait]
impl WebhookSink for HttpWebhookSink {
    async fn post(
        &self,
        payload: &Value,
        headers: Option<&[(String, String)]>,
    ) -> PipelineResult<()> {
        if self.urls.is_empty() {
            return Err(PipelineError::Notification(
                "no webhook URLs configured".to_string(),
            ));
        }

        let mut delivered = 0usize;
        let mut last_error = None;
        for url in &self.urls {
            let mut request = self.client.post(url).json(payload);
            if let Some(headers) = headers {
                for (name, value) in headers {
                    request = request.header(name, value);
                }
            }
            match request.send().await.and_then(|r| r.error_for_status()) {
                Ok(_) => {
                    debug!(url = %url, "webhook delivered");
                    delivered += 1;
                }
                Err(err) => last_error = Some(err.to_string()),
            }
        }

        if delivered > 0 {
            Ok(())
        } else {
            Err(PipelineError::Notification(
                last_error.unwrap_or_else(|| "all webhook deliveries failed".to_string()),
            ))
        }
    }
}

/// Chat sink POSTing a color-coded payload to a chat webhook
pub struct HttpChatSink {
    webhook_url: String,
    channel: String,
    client: reqwest::Client,
}

impl HttpChatSink {
    pub fn new(webhook_url: String, channel: String, timeout: Duration) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Notification(e.to_string()))?;
        Ok(Self {
            webhook_url,
            channel,
            client,
        })
    }

    fn color(severity: Severity) -> &'static str {
        match severity {
            Severity::Low => "#36a64f",
            Severity::Medium => "#ffaa00",
            Severity::High => "#ff0000",
            Severity::Critical => "#8b0000",
        }
    }
}

#[async_trait]
impl ChatSink for HttpChatSink {
    async fn send(
        &self,
        message: &str,
        severity: Severity,
        attachments: Option<Value>,
    ) -> PipelineResult<()> {
        let mut attachments = match attachments {
            Some(Value::Array(list)) => list,
            Some(other) => vec![other],
            None => vec![json!({})],
        };
        if let Some(Value::Object(first)) = attachments.first_mut() {
            first.insert("color".to_string(), json!(Self::color(severity)));
        }

        let payload = json!({
            "channel": self.channel,
            "username": "GRIDSHIELD",
            "text": message,
            "attachments": attachments,
        });

        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        info!(channel = %self.channel, "chat notification sent");
        Ok(())
    }
}

/// Recorded email for inspection
#[derive(Debug, Clone)]
pub struct RecordedEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// In-memory email sink for development and tests
#[derive(Debug, Default)]
pub struct MemoryEmailSink {
    sent: Mutex<Vec<RecordedEmail>>,
}

impl MemoryEmailSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<RecordedEmail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl EmailSink for MemoryEmailSink {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        _html_body: Option<&str>,
    ) -> PipelineResult<()> {
        self.sent.lock().push(RecordedEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: text_body.to_string(),
        });
        Ok(())
    }
}

/// In-memory webhook sink for development and tests
#[derive(Debug, Default)]
pub struct MemoryWebhookSink {
    posts: Mutex<Vec<Value>>,
    pub fail: std::sync::atomic::AtomicBool,
}

impl MemoryWebhookSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn posts(&self) -> Vec<Value> {
        self.posts.lock().clone()
    }
}

#[async_trait]
impl WebhookSink for MemoryWebhookSink {
    async fn post(
        &self,
        payload: &Value,
        _headers: Option<&[(String, String)]>,
    ) -> PipelineResult<()> {
        if self.fail.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(PipelineError::Notification("sink down".to_string()));
        }
        self.posts.lock().push(payload.clone());
        Ok(())
    }
}
