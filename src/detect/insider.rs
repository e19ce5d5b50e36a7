//! Insider Threat Detector
//! =======================
//! Per-user behavior counters: after-hours activity and failed access
//! accumulate toward thresholds; privilege-escalation and data-movement
//! terms are stateless indicators.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use aho_corasick::AhoCorasick;
use async_trait::async_trait;
use chrono::Timelike;
use dashmap::DashMap;
use lazy_static::lazy_static;
use serde_json::json;
use tracing::warn;

use crate::config::InsiderConfig;
use crate::detect::{AttackType, Detection, Detector, Severity};
use crate::error::PipelineResult;
use crate::ingest::{CanonicalRecord, LogLevel};

lazy_static! {
    static ref PRIVILEGE_TERMS: AhoCorasick = AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(["sudo", "admin"])
        .unwrap();
    static ref DATA_ACCESS_TERMS: AhoCorasick = AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(["download", "export", "copy", "transfer"])
        .unwrap();
}

/// Counter keys tracked per user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PatternKey {
    UnusualHours,
    FailedAccess,
}

pub struct InsiderDetector {
    unusual_hours_threshold: u32,
    failed_access_threshold: u32,
    pattern_counts: DashMap<(String, PatternKey), u32>,
}

impl InsiderDetector {
    pub fn new(config: &InsiderConfig) -> Self {
        Self {
            unusual_hours_threshold: config.unusual_hours_threshold,
            failed_access_threshold: config.failed_access_threshold,
            pattern_counts: DashMap::new(),
        }
    }

    fn bump(&self, user: &str, key: PatternKey) -> u32 {
        let mut counter = self
            .pattern_counts
            .entry((user.to_string(), key))
            .or_insert(0);
        *counter += 1;
        *counter
    }

    /// Unusual hours: 22:00-06:00, judged on event time.
    fn is_unusual_hours(record: &CanonicalRecord) -> bool {
        let hour = record.timestamp.hour();
        hour >= 22 || hour < 6
    }
}

#[async_trait]
impl Detector for InsiderDetector {
    fn name(&self) -> &'static str {
        "insider_threat"
    }

    async fn detect(&self, record: &CanonicalRecord) -> PipelineResult<Option<Detection>> {
        let Some(user) = record.user().map(|u| u.to_string()) else {
            return Ok(None);
        };

        let message = record.message.to_lowercase();
        let mut indicators = Vec::new();

        if Self::is_unusual_hours(record)
            && self.bump(&user, PatternKey::UnusualHours) >= self.unusual_hours_threshold
        {
            indicators.push("unusual_hours".to_string());
        }

        if (message.contains("failed") || record.level == LogLevel::Error)
            && self.bump(&user, PatternKey::FailedAccess) >= self.failed_access_threshold
        {
            indicators.push("multiple_failed_access".to_string());
        }

        if PRIVILEGE_TERMS.is_match(&message) {
            indicators.push("privilege_escalation".to_string());
        }

        if DATA_ACCESS_TERMS.is_match(&message) {
            indicators.push("data_access".to_string());
        }

        if !indicators.is_empty() {
            warn!(user = %user, ?indicators, "insider threat detected");
            let confidence = (indicators.len() as f64 / 3.0).min(1.0);
            return Ok(Some(Detection {
                attack_type: AttackType::InsiderThreat,
                detector: self.name().to_string(),
                severity: Severity::High,
                confidence,
                indicators,
                context: [("user".to_string(), json!(user))].into(),
            }));
        }

        // ML fallback for behavioral drift the counters miss.
        if let Some(prediction) = record.ml_prediction.as_ref() {
            if prediction.attack_type == AttackType::InsiderThreat && prediction.confidence > 0.7 {
                return Ok(Some(Detection {
                    attack_type: AttackType::InsiderThreat,
                    detector: self.name().to_string(),
                    severity: Severity::High,
                    confidence: prediction.confidence,
                    indicators: vec!["ml_detected".to_string()],
                    context: [("user".to_string(), json!(user))].into(),
                }));
            }
        }

        Ok(None)
    }
}
