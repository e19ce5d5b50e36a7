//! Zero-Day Detector
//! =================
//! A strong anomaly with no recognized attack class is treated as a
//! potential unknown exploit.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::config::ZeroDayConfig;
use crate::detect::{AttackType, Detection, Detector, Severity};
use crate::error::PipelineResult;
use crate::ingest::CanonicalRecord;

pub struct ZeroDayDetector {
    anomaly_threshold: f64,
}

impl ZeroDayDetector {
    pub fn new(config: &ZeroDayConfig) -> Self {
        Self {
            anomaly_threshold: config.anomaly_threshold,
        }
    }
}

#[async_trait]
impl Detector for ZeroDayDetector {
    fn name(&self) -> &'static str {
        "zero_day"
    }

    async fn detect(&self, record: &CanonicalRecord) -> PipelineResult<Option<Detection>> {
        let Some(prediction) = record.ml_prediction.as_ref() else {
            return Ok(None);
        };

        if prediction.is_anomaly
            && prediction.attack_type == AttackType::Normal
            && prediction.anomaly_score.abs() > self.anomaly_threshold
        {
            warn!(
                anomaly_score = %format!("{:.2}", prediction.anomaly_score),
                "potential zero-day exploit detected"
            );
            return Ok(Some(Detection {
                attack_type: AttackType::ZeroDay,
                detector: self.name().to_string(),
                severity: Severity::Critical,
                confidence: prediction.anomaly_score.abs().min(1.0),
                indicators: vec!["unclassified_anomaly".to_string()],
                context: [(
                    "anomaly_score".to_string(),
                    json!(prediction.anomaly_score),
                )]
                .into(),
            }));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::test_util::record;
    use crate::ml::MlPrediction;

    fn with_prediction(
        anomaly: bool,
        score: f64,
        attack_type: AttackType,
    ) -> CanonicalRecord {
        let mut rec = record(r#"{"message":"strange payload"}"#);
        let mut prediction = MlPrediction::neutral();
        prediction.is_anomaly = anomaly;
        prediction.anomaly_score = score;
        prediction.attack_type = attack_type;
        rec.ml_prediction = Some(prediction);
        rec
    }

    #[tokio::test]
    async fn test_unclassified_anomaly_fires() {
        let detector = ZeroDayDetector::new(&ZeroDayConfig::default());
        let rec = with_prediction(true, -0.95, AttackType::Normal);
        let detection = detector.detect(&rec).await.unwrap().unwrap();
        assert_eq!(detection.attack_type, AttackType::ZeroDay);
        assert_eq!(detection.severity, Severity::Critical);
        assert!((detection.confidence - 0.95).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_classified_anomaly_is_not_zero_day() {
        let detector = ZeroDayDetector::new(&ZeroDayConfig::default());
        let rec = with_prediction(true, -0.95, AttackType::Ddos);
        assert!(detector.detect(&rec).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_weak_anomaly_ignored() {
        let detector = ZeroDayDetector::new(&ZeroDayConfig::default());
        let rec = with_prediction(true, -0.3, AttackType::Normal);
        assert!(detector.detect(&rec).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_prediction_no_detection() {
        let detector = ZeroDayDetector::new(&ZeroDayConfig::default());
        let rec = record(r#"{"message":"x"}"#);
        assert!(detector.detect(&rec).await.unwrap().is_none());
    }
}
