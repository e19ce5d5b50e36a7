//! DDoS Detector
//! =============
//! Per-source sliding request window. The configured threshold is a
//! request budget per window; pruning is done against the current wall
//! clock so skewed event timestamps cannot pin stale entries.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde_json::json;
use std::collections::VecDeque;
use tracing::warn;

use crate::config::DdosConfig;
use crate::detect::{AttackType, Detection, Detector, Severity};
use crate::error::PipelineResult;
use crate::ingest::CanonicalRecord;

pub struct DdosDetector {
    rps_threshold: f64,
    window: Duration,
    window_seconds: f64,
    request_counts: DashMap<String, VecDeque<DateTime<Utc>>>,
}

impl DdosDetector {
    pub fn new(config: &DdosConfig) -> Self {
        Self {
            rps_threshold: config.rps_threshold as f64,
            window: Duration::seconds(config.window_seconds as i64),
            window_seconds: config.window_seconds as f64,
            request_counts: DashMap::new(),
        }
    }

    /// Record an arrival for the source and return the pruned window size.
    fn observe(&self, source_ip: &str, now: DateTime<Utc>) -> usize {
        let mut entry = self
            .request_counts
            .entry(source_ip.to_string())
            .or_default();
        entry.push_back(now);
        let cutoff = now - self.window;
        while matches!(entry.front(), Some(ts) if *ts <= cutoff) {
            entry.pop_front();
        }
        entry.len()
    }

    #[cfg(test)]
    pub(crate) fn window_len(&self, source_ip: &str) -> usize {
        self.request_counts
            .get(source_ip)
            .map(|w| w.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Detector for DdosDetector {
    fn name(&self) -> &'static str {
        "ddos"
    }

    async fn detect(&self, record: &CanonicalRecord) -> PipelineResult<Option<Detection>> {
        let Some(source_ip) = record.source_ip().map(|ip| ip.to_string()) else {
            return Ok(None);
        };

        let request_count = self.observe(&source_ip, Utc::now());
        let requests_per_second = request_count as f64 / self.window_seconds;
        let threshold_rps = self.rps_threshold / self.window_seconds;

        if requests_per_second <= threshold_rps {
            return Ok(None);
        }

        warn!(
            source_ip = %source_ip,
            rps = %format!("{requests_per_second:.2}"),
            threshold = self.rps_threshold,
            "DDoS attack detected"
        );

        Ok(Some(Detection {
            attack_type: AttackType::Ddos,
            detector: self.name().to_string(),
            severity: Severity::High,
            confidence: (requests_per_second / (threshold_rps * 2.0)).min(1.0),
            indicators: vec!["request_flood".to_string()],
            context: [
                ("source_ip".to_string(), json!(source_ip)),
                ("requests_per_second".to_string(), json!(requests_per_second)),
                ("request_count".to_string(), json!(request_count)),
                ("threshold".to_string(), json!(self.rps_threshold)),
            ]
            .into_iter()
            .collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::test_util::record;

    #[tokio::test]
    async fn test_trips_above_window_budget() {
        let detector = DdosDetector::new(&DdosConfig {
            rps_threshold: 100,
            window_seconds: 60,
        });
        let rec = record(r#"{"message":"GET /","src_ip":"10.0.0.1"}"#);

        let mut last = None;
        for _ in 0..120 {
            last = detector.detect(&rec).await.unwrap();
        }

        let detection = last.expect("120 requests in the window must trip the detector");
        assert_eq!(detection.attack_type, AttackType::Ddos);
        assert_eq!(detection.severity, Severity::High);
        let rps = detection.context["requests_per_second"].as_f64().unwrap();
        assert!((rps - 2.0).abs() < 1e-9);
        // min(1, 2.0 / (2 * 100/60)) = 0.6
        assert!((detection.confidence - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_quiet_source_stays_silent() {
        let detector = DdosDetector::new(&DdosConfig::default());
        let rec = record(r#"{"message":"GET /","src_ip":"10.0.0.2"}"#);
        for _ in 0..50 {
            assert!(detector.detect(&rec).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_window_is_pruned() {
        let detector = DdosDetector::new(&DdosConfig {
            rps_threshold: 1000,
            window_seconds: 1,
        });
        let rec = record(r#"{"message":"GET /","src_ip":"10.0.0.3"}"#);
        for _ in 0..10 {
            detector.detect(&rec).await.unwrap();
        }
        assert_eq!(detector.window_len("10.0.0.3"), 10);

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        detector.detect(&rec).await.unwrap();
        // All older entries are outside the one-second window.
        assert_eq!(detector.window_len("10.0.0.3"), 1);
    }

    #[tokio::test]
    async fn test_no_ip_no_detection() {
        let detector = DdosDetector::new(&DdosConfig::default());
        let rec = record(r#"{"message":"no address"}"#);
        assert!(detector.detect(&rec).await.unwrap().is_none());
    }
}
