//! Alert Escalation
//! ================
//! Rule-driven replay of notification actions for unresolved alerts at
//! timeout multiples of the escalation level.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use chrono::Utc;
use serde_json::Value;
use tracing::info;

use crate::alerting::alert_manager::Alert;
use crate::config::{EscalationConfig, EscalationRuleConfig};

#[derive(Debug, Clone)]
pub struct EscalationRule {
    pub name: String,
    pub conditions: std::collections::HashMap<String, Value>,
    pub actions: Vec<String>,
    pub timeout_seconds: u64,
}

impl From<&EscalationRuleConfig> for EscalationRule {
    fn from(config: &EscalationRuleConfig) -> Self {
        Self {
            name: config.name.clone(),
            conditions: config.conditions.clone(),
            actions: config.actions.clone(),
            timeout_seconds: config.timeout_seconds,
        }
    }
}

impl EscalationRule {
    /// Match conditions against the alert's serialized fields.
    fn matches(&self, alert: &Alert) -> bool {
        let Ok(fields) = serde_json::to_value(alert) else {
            return false;
        };
        self.conditions
            .iter()
            .all(|(key, expected)| fields.get(key) == Some(expected))
    }
}

pub struct EscalationManager {
    rules: Vec<EscalationRule>,
}

impl EscalationManager {
    pub fn new(config: &EscalationConfig) -> Self {
        Self {
            rules: config.rules.iter().map(EscalationRule::from).collect(),
        }
    }

    pub fn add_rule(&mut self, rule: EscalationRule) {
        info!(rule = %rule.name, "escalation rule added");
        self.rules.push(rule);
    }

    /// Channels to replay for this alert at the given escalation level.
    /// A rule fires once its timeout, scaled by `level + 1`, has elapsed
    /// since the alert was created.
    pub fn due_actions(&self, alert: &Alert, level: u32) -> Vec<String> {
        let elapsed = (Utc::now() - alert.created_at).num_seconds().max(0) as u64;
        let mut actions = Vec::new();
        for rule in &self.rules {
            if rule.matches(alert) && elapsed >= rule.timeout_seconds * (level as u64 + 1) {
                actions.extend(rule.actions.iter().cloned());
            }
        }
        actions
    }

    /// Escalation level an alert of this age has reached under a rule, or
    /// none when no rule matches.
    pub fn level_for(&self, alert: &Alert) -> Option<u32> {
        let elapsed = (Utc::now() - alert.created_at).num_seconds().max(0) as u64;
        self.rules
            .iter()
            .filter(|rule| rule.matches(alert) && rule.timeout_seconds > 0)
            .map(|rule| (elapsed / rule.timeout_seconds).saturating_sub(1) as u32)
            .max()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
