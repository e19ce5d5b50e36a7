//! Alert Manager
//! =============
//! Alert lifecycle and deduplication over a bounded history ring.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::info;
use uuid::Uuid;

use crate::detect::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Pending,
    Sent,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub source: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub status: AlertStatus,
    #[serde(default)]
    pub sent_channels: BTreeSet<String>,
}

/// Filters for alert listing
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub severity: Option<Severity>,
    pub source: Option<String>,
    pub status: Option<AlertStatus>,
}

struct ManagerInner {
    alerts: HashMap<String, Alert>,
    /// Insertion-ordered ring of alert ids, bounded by `max_history`.
    history: VecDeque<String>,
}

pub struct AlertManager {
    dedup_window: Duration,
    max_history: usize,
    inner: RwLock<ManagerInner>,
}

impl AlertManager {
    pub fn new(dedup_window_secs: u64, max_history: usize) -> Self {
        Self {
            dedup_window: Duration::seconds(dedup_window_secs as i64),
            max_history,
            inner: RwLock::new(ManagerInner {
                alerts: HashMap::new(),
                history: VecDeque::new(),
            }),
        }
    }

    pub fn create(
        &self,
        title: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        source: impl Into<String>,
        metadata: HashMap<String, Value>,
    ) -> Alert {
        let alert = Alert {
            alert_id: Uuid::new_v4().to_string(),
            title: title.into(),
            message: message.into(),
            severity,
            source: source.into(),
            metadata,
            created_at: Utc::now(),
            status: AlertStatus::Pending,
            sent_channels: BTreeSet::new(),
        };

        let mut inner = self.inner.write();
        inner.history.push_back(alert.alert_id.clone());
        inner.alerts.insert(alert.alert_id.clone(), alert.clone());

        // Trim the ring FIFO once the cap is exceeded.
        while inner.history.len() > self.max_history {
            if let Some(old_id) = inner.history.pop_front() {
                inner.alerts.remove(&old_id);
            }
        }

        info!(title = %alert.title, severity = %severity, "alert created");
        alert
    }

    pub fn get(&self, alert_id: &str) -> Option<Alert> {
        self.inner.read().alerts.get(alert_id).cloned()
    }

    /// Alerts matching the filter, newest first.
    pub fn list(&self, filter: &AlertFilter) -> Vec<Alert> {
        let inner = self.inner.read();
        let mut alerts: Vec<Alert> = inner
            .alerts
            .values()
            .filter(|a| filter.severity.map(|s| a.severity == s).unwrap_or(true))
            .filter(|a| {
                filter
                    .source
                    .as_ref()
                    .map(|s| &a.source == s)
                    .unwrap_or(true)
            })
            .filter(|a| filter.status.map(|s| a.status == s).unwrap_or(true))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        alerts
    }

    pub fn mark_sent(&self, alert_id: &str, channel: impl Into<String>) {
        let mut inner = self.inner.write();
        if let Some(alert) = inner.alerts.get_mut(alert_id) {
            alert.sent_channels.insert(channel.into());
            alert.status = AlertStatus::Sent;
        }
    }

    pub fn mark_resolved(&self, alert_id: &str) -> bool {
        let mut inner = self.inner.write();
        match inner.alerts.get_mut(alert_id) {
            Some(alert) => {
                alert.status = AlertStatus::Resolved;
                info!(alert_id = %alert_id, "alert resolved");
                true
            }
            None => false,
        }
    }

    /// Duplicate check: scan history newest to oldest, stopping at the
    /// window boundary. Equal title and message means duplicate.
    pub fn is_duplicate(&self, title: &str, message: &str, window: Option<Duration>) -> bool {
        let window = window.unwrap_or(self.dedup_window);
        let cutoff = Utc::now() - window;
        let inner = self.inner.read();
        for alert_id in inner.history.iter().rev() {
            let Some(alert) = inner.alerts.get(alert_id) else {
                continue;
            };
            if alert.created_at < cutoff {
                break;
            }
            if alert.title == title && alert.message == message {
                return true;
            }
        }
        false
    }

    /// Unresolved alerts, used by the escalation sweep.
    pub fn unresolved(&self) -> Vec<Alert> {
        let inner = self.inner.read();
        inner
            .alerts
            .values()
            .filter(|a| a.status != AlertStatus::Resolved)
            .cloned()
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.inner.read().history.len()
    }
}
