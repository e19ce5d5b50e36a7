//! Configuration
//! =============
//! Explicit configuration structs for every pipeline component, with
//! defaults matching production thresholds and a validation pass that
//! rejects out-of-range values. Loadable from YAML.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{PipelineError, PipelineResult};

/// Top-level pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineConfig {
    pub ingest: IngestConfig,
    pub alerting: AlertingConfig,
    pub escalation: EscalationConfig,
    pub ddos: DdosConfig,
    pub apt: AptConfig,
    pub insider: InsiderConfig,
    pub zero_day: ZeroDayConfig,
    pub approval: ApprovalConfig,
    pub circuit_breaker: CircuitBreakerSettings,
    pub stream: StreamConfig,
    pub notification: NotificationConfig,
    pub filters: FilterConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct IngestConfig {
    /// CSV field delimiter
    pub csv_delimiter: char,
    /// Preset CSV column names; first row is used when absent
    pub csv_fields: Option<Vec<String>>,
    /// Messages longer than this are truncated
    pub max_message_len: usize,
    /// Event timestamps further ahead of wall clock than this fall back to ingest time
    pub max_drift_secs: i64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            csv_delimiter: ',',
            csv_fields: None,
            max_message_len: 4096,
            max_drift_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AlertingConfig {
    /// Identical alerts inside this window are suppressed
    pub dedup_window_secs: u64,
    /// Alert history ring capacity
    pub max_history: usize,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: 300,
            max_history: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EscalationConfig {
    pub rules: Vec<EscalationRuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EscalationRuleConfig {
    pub name: String,
    #[serde(default)]
    pub conditions: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default = "default_escalation_timeout")]
    pub timeout_seconds: u64,
}

fn default_escalation_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DdosConfig {
    /// Request budget per window before a source trips the detector
    pub rps_threshold: u32,
    pub window_seconds: u64,
}

impl Default for DdosConfig {
    fn default() -> Self {
        Self {
            rps_threshold: 100,
            window_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AptConfig {
    pub timeline_days: i64,
    pub min_activities: usize,
}

impl Default for AptConfig {
    fn default() -> Self {
        Self {
            timeline_days: 30,
            min_activities: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct InsiderConfig {
    pub unusual_hours_threshold: u32,
    pub failed_access_threshold: u32,
}

impl Default for InsiderConfig {
    fn default() -> Self {
        Self {
            unusual_hours_threshold: 3,
            failed_access_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ZeroDayConfig {
    pub anomaly_threshold: f64,
}

impl Default for ZeroDayConfig {
    fn default() -> Self {
        Self {
            anomaly_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ApprovalConfig {
    /// Pending requests expire after this many seconds
    pub auto_approve_timeout_secs: u64,
    pub require_approval: bool,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            auto_approve_timeout_secs: 300,
            require_approval: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CircuitBreakerSettings {
    pub isolation_failure_threshold: u32,
    pub failover_failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            isolation_failure_threshold: 5,
            failover_failure_threshold: 3,
            cooldown_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StreamConfig {
    /// Worker tasks pulling from the ingestion bus
    pub workers: usize,
    /// Upper bound on records processed concurrently
    pub max_in_flight: usize,
    /// Grace period for draining in-flight records on shutdown
    pub drain_grace_secs: u64,
    /// Per-call actuator timeout
    pub actuator_timeout_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_in_flight: 64,
            drain_grace_secs: 10,
            actuator_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct NotificationConfig {
    /// Enabled channel names (subset of email/chat/webhook)
    pub channels: Vec<String>,
    /// Webhook endpoint URLs
    pub webhook_urls: Vec<String>,
    /// Chat webhook endpoint
    pub chat_webhook_url: Option<String>,
    pub chat_channel: String,
    /// Email recipients keyed by severity, "default" as fallback
    pub email_recipients: HashMap<String, Vec<String>>,
    /// Outbound webhook timeout
    pub webhook_timeout_secs: u64,
    /// SMTP send timeout
    pub email_timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channels: vec!["webhook".to_string()],
            webhook_urls: Vec::new(),
            chat_webhook_url: None,
            chat_channel: "#alerts".to_string(),
            email_recipients: HashMap::new(),
            webhook_timeout_secs: 10,
            email_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FilterConfig {
    /// Records below this level are dropped before persistence
    pub min_level: Option<String>,
    /// When non-empty, only these sources pass
    pub allowed_sources: Vec<String>,
    pub blocked_sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ApiConfig {
    pub bind_addr: String,
    /// Bearer token required for approval and audit routes
    pub auth_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            auth_token: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file and validate it.
    pub fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig =
            serde_yaml::from_str(&raw).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would break pipeline invariants.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.ddos.window_seconds == 0 {
            return Err(PipelineError::Config(
                "ddos.window_seconds must be positive".to_string(),
            ));
        }
        if self.ddos.rps_threshold == 0 {
            return Err(PipelineError::Config(
                "ddos.rps_threshold must be positive".to_string(),
            ));
        }
        if self.apt.timeline_days <= 0 {
            return Err(PipelineError::Config(
                "apt.timeline_days must be positive".to_string(),
            ));
        }
        if !(0.0..=10.0).contains(&self.zero_day.anomaly_threshold) {
            return Err(PipelineError::Config(
                "zero_day.anomaly_threshold out of range".to_string(),
            ));
        }
        if self.approval.auto_approve_timeout_secs == 0 {
            return Err(PipelineError::Config(
                "approval.auto_approve_timeout_secs must be positive".to_string(),
            ));
        }
        if self.stream.workers == 0 || self.stream.max_in_flight == 0 {
            return Err(PipelineError::Config(
                "stream.workers and stream.max_in_flight must be positive".to_string(),
            ));
        }
        if self.alerting.max_history == 0 {
            return Err(PipelineError::Config(
                "alerting.max_history must be positive".to_string(),
            ));
        }
        for channel in &self.notification.channels {
            if !matches!(channel.as_str(), "email" | "chat" | "webhook") {
                return Err(PipelineError::Config(format!(
                    "unknown notification channel: {channel}"
                )));
            }
        }
        Ok(())
    }
}
