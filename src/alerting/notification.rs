//! Notification Service
//! ====================
//! Deduplicates, records, and fans alerts out to the configured channels.
//! Overall delivery succeeds when any channel succeeds. An escalation
//! sweep replays channels for unresolved alerts.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::alerting::alert_manager::{Alert, AlertManager};
use crate::alerting::channels::{ChatSink, EmailSink, WebhookSink};
use crate::alerting::escalation::EscalationManager;
use crate::config::NotificationConfig;
use crate::detect::{Detection, Severity};
use crate::metrics::record_alert_sent;

/// Outcome of a send attempt
#[derive(Debug, Clone)]
pub enum SendResult {
    /// Suppressed by the deduplication window
    Duplicate,
    Sent {
        alert_id: String,
        /// Per-channel delivery outcomes
        channels: HashMap<String, bool>,
        /// Any channel succeeded
        success: bool,
    },
}

impl SendResult {
    pub fn succeeded(&self) -> bool {
        matches!(self, SendResult::Sent { success: true, .. })
    }
}

pub struct NotificationService {
    alert_manager: Arc<AlertManager>,
    escalation: EscalationManager,
    enabled_channels: Vec<String>,
    email: Option<Arc<dyn EmailSink>>,
    chat: Option<Arc<dyn ChatSink>>,
    webhook: Option<Arc<dyn WebhookSink>>,
    email_recipients: HashMap<String, Vec<String>>,
}

impl NotificationService {
    pub fn new(
        alert_manager: Arc<AlertManager>,
        escalation: EscalationManager,
        config: &NotificationConfig,
        email: Option<Arc<dyn EmailSink>>,
        chat: Option<Arc<dyn ChatSink>>,
        webhook: Option<Arc<dyn WebhookSink>>,
    ) -> Self {
        Self {
            alert_manager,
            escalation,
            enabled_channels: config.channels.clone(),
            email,
            chat,
            webhook,
            email_recipients: config.email_recipients.clone(),
        }
    }

    pub fn alert_manager(&self) -> &Arc<AlertManager> {
        &self.alert_manager
    }

    /// Send an alert through the configured channels, or a caller-chosen
    /// subset of them.
    pub async fn send_alert(
        &self,
        title: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        source: impl Into<String>,
        metadata: HashMap<String, Value>,
        channels: Option<&[String]>,
    ) -> SendResult {
        let title = title.into();
        let message = message.into();

        if self.alert_manager.is_duplicate(&title, &message, None) {
            debug!(title = %title, "duplicate alert suppressed");
            return SendResult::Duplicate;
        }

        let alert = self
            .alert_manager
            .create(title, message, severity, source, metadata);

        let channels_to_use: Vec<String> = channels
            .map(|c| c.to_vec())
            .unwrap_or_else(|| self.enabled_channels.clone());

        let results = self.deliver(&alert, &channels_to_use).await;
        let success = results.values().any(|ok| *ok);

        SendResult::Sent {
            alert_id: alert.alert_id,
            channels: results,
            success,
        }
    }

    async fn deliver(&self, alert: &Alert, channels: &[String]) -> HashMap<String, bool> {
        let mut results = HashMap::new();

        for channel in channels {
            match channel.as_str() {
                "email" => {
                    let Some(email) = self.email.as_ref() else {
                        continue;
                    };
                    for recipient in self.email_recipients_for(alert.severity) {
                        let key = format!("email:{recipient}");
                        let subject = format!(
                            "[GRIDSHIELD] {}: {}",
                            alert.severity.as_str().to_uppercase(),
                            alert.title
                        );
                        let body = format!(
                            "GridShield Security Alert\n\nTitle: {}\nSeverity: {}\nSource: {}\nTime: {}\n\n{}\n",
                            alert.title,
                            alert.severity,
                            alert.source,
                            alert.created_at.to_rfc3339(),
                            alert.message
                        );
                        match email.send(&recipient, &subject, &body, None).await {
                            Ok(()) => {
                                self.alert_manager.mark_sent(&alert.alert_id, key.as_str());
                                record_alert_sent("email", alert.severity.as_str());
                                results.insert(key, true);
                            }
                            Err(err) => {
                                error!(recipient = %recipient, %err, "email delivery failed");
                                results.insert(key, false);
                            }
                        }
                    }
                }
                "chat" => {
                    let Some(chat) = self.chat.as_ref() else {
                        continue;
                    };
                    let text = format!("*{}*\n{}", alert.title, alert.message);
                    let attachments = json!([{ "fields": [
                        { "title": "Severity", "value": alert.severity.as_str(), "short": true },
                        { "title": "Source", "value": alert.source, "short": true },
                        { "title": "Time", "value": alert.created_at.to_rfc3339(), "short": false },
                    ]}]);
                    match chat.send(&text, alert.severity, Some(attachments)).await {
                        Ok(()) => {
                            self.alert_manager.mark_sent(&alert.alert_id, "chat");
                            record_alert_sent("chat", alert.severity.as_str());
                            results.insert("chat".to_string(), true);
                        }
                        Err(err) => {
                            error!(%err, "chat delivery failed");
                            results.insert("chat".to_string(), false);
                        }
                    }
                }
                "webhook" => {
                    let Some(webhook) = self.webhook.as_ref() else {
                        continue;
                    };
                    let payload = json!({
                        "event_type": "alert",
                        "alert": alert,
                        "timestamp": alert.created_at.to_rfc3339(),
                    });
                    match webhook.post(&payload, None).await {
                        Ok(()) => {
                            self.alert_manager.mark_sent(&alert.alert_id, "webhook");
                            record_alert_sent("webhook", alert.severity.as_str());
                            results.insert("webhook".to_string(), true);
                        }
                        Err(err) => {
                            error!(%err, "webhook delivery failed");
                            results.insert("webhook".to_string(), false);
                        }
                    }
                }
                other => {
                    debug!(channel = other, "unknown channel skipped");
                }
            }
        }

        results
    }

    fn email_recipients_for(&self, severity: Severity) -> Vec<String> {
        self.email_recipients
            .get(severity.as_str())
            .filter(|r| !r.is_empty())
            .or_else(|| self.email_recipients.get("default"))
            .cloned()
            .unwrap_or_default()
    }

    /// Send the alert composed for a confirmed threat detection.
    pub async fn send_threat_alert(&self, detection: &Detection) -> SendResult {
        let title = format!(
            "{} Attack Detected",
            detection.attack_type.as_str().to_uppercase()
        );
        let message = format!(
            "Attack type: {}\nSource IP: {}\nSeverity: {}\nConfidence: {:.2}%",
            detection.attack_type,
            detection.source_ip().unwrap_or("unknown"),
            detection.severity,
            detection.confidence * 100.0
        );
        let metadata = match serde_json::to_value(detection) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => HashMap::new(),
        };

        self.send_alert(
            title,
            message,
            detection.severity,
            "threat_detection",
            metadata,
            None,
        )
        .await
    }

    /// One escalation pass: replay rule channels for unresolved alerts
    /// whose timeout has elapsed at their current level.
    pub async fn run_escalation_sweep(&self) -> usize {
        if self.escalation.is_empty() {
            return 0;
        }

        let mut replayed = 0;
        for alert in self.alert_manager.unresolved() {
            let Some(level) = self.escalation.level_for(&alert) else {
                continue;
            };
            let actions = self.escalation.due_actions(&alert, level);
            if actions.is_empty() {
                continue;
            }
            info!(alert_id = %alert.alert_id, level, ?actions, "escalating alert");
            self.deliver(&alert, &actions).await;
            replayed += 1;
        }
        replayed
    }
}
