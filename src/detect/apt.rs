//! APT Detector
//! ============
//! Long-horizon activity timeline per source address. A detection needs
//! sustained presence plus a low-and-slow cadence; bursts are someone
//! else's problem.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde_json::json;
use std::collections::VecDeque;
use tracing::warn;

use crate::config::AptConfig;
use crate::detect::{AttackType, Detection, Detector, Severity};
use crate::error::PipelineResult;
use crate::ingest::CanonicalRecord;

pub struct AptDetector {
    timeline_window: Duration,
    min_activities: usize,
    activity_timeline: DashMap<String, VecDeque<DateTime<Utc>>>,
}

impl AptDetector {
    pub fn new(config: &AptConfig) -> Self {
        Self {
            timeline_window: Duration::days(config.timeline_days),
            min_activities: config.min_activities,
            activity_timeline: DashMap::new(),
        }
    }

    fn observe(&self, source_ip: &str, at: DateTime<Utc>, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let mut entry = self
            .activity_timeline
            .entry(source_ip.to_string())
            .or_default();
        entry.push_back(at);
        let cutoff = now - self.timeline_window;
        while matches!(entry.front(), Some(ts) if *ts <= cutoff) {
            entry.pop_front();
        }
        entry.iter().copied().collect()
    }

    /// Seed historical activity; used by replay tooling and tests.
    pub fn record_activity_at(&self, source_ip: &str, at: DateTime<Utc>) {
        self.activity_timeline
            .entry(source_ip.to_string())
            .or_default()
            .push_back(at);
    }
}

#[async_trait]
impl Detector for AptDetector {
    fn name(&self) -> &'static str {
        "apt"
    }

    async fn detect(&self, record: &CanonicalRecord) -> PipelineResult<Option<Detection>> {
        let Some(source_ip) = record.source_ip().map(|ip| ip.to_string()) else {
            return Ok(None);
        };

        let now = Utc::now();
        let timeline = self.observe(&source_ip, now, now);
        let activity_count = timeline.len();

        if activity_count < self.min_activities {
            return Ok(None);
        }

        let mut indicators = Vec::new();

        // Low and slow: sustained presence at under two events per day.
        let span_days = timeline
            .first()
            .map(|first| (now - *first).num_days())
            .unwrap_or(0);
        if span_days > 7 && (activity_count as i64) < span_days * 2 {
            indicators.push("low_and_slow".to_string());
        }

        if let Some(prediction) = record.ml_prediction.as_ref() {
            if prediction.attack_type == AttackType::Apt {
                indicators.push("ml_detected".to_string());
            }
        }

        if indicators.is_empty() {
            return Ok(None);
        }

        warn!(source_ip = %source_ip, ?indicators, "APT activity detected");

        Ok(Some(Detection {
            attack_type: AttackType::Apt,
            detector: self.name().to_string(),
            severity: Severity::Critical,
            confidence: (activity_count as f64 / (self.min_activities as f64 * 2.0)).min(1.0),
            indicators,
            context: [
                ("source_ip".to_string(), json!(source_ip)),
                ("activity_count".to_string(), json!(activity_count)),
                ("timeline_days".to_string(), json!(span_days)),
            ]
            .into_iter()
            .collect(),
        }))
    }
}
