//! Ransomware Detector
//! ===================
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use tracing::error;

use crate::detect::{AttackType, Detection, Detector, Severity};
use crate::error::PipelineResult;
use crate::ingest::CanonicalRecord;

lazy_static! {
    static ref RANSOMWARE_PATTERNS: Vec<(&'static str, Regex)> = vec![
        // File encryption
        ("file_encryption", Regex::new(r"(?i)(encrypt|encryption).*(file|document|data)").unwrap()),
        ("encrypted_extension", Regex::new(r"(?i)(\.encrypted|\.locked|\.crypto)").unwrap()),
        // Ransom notes
        ("ransom_terms", Regex::new(r"(?i)(ransom|ransomware|decrypt|payment|bitcoin)").unwrap()),
        ("ransom_note", Regex::new(r"(?i)(readme\.txt|decrypt.*instructions)").unwrap()),
        // Suspicious file operations
        ("mass_file_ops", Regex::new(r"(?i)(mass.?delete|bulk.?rename|file.?modification)").unwrap()),
        ("shadow_copy", Regex::new(r"(?i)(shadow.?copy|volume.?shadow)").unwrap()),
    ];
}

#[derive(Debug, Default)]
pub struct RansomwareDetector;

#[async_trait]
impl Detector for RansomwareDetector {
    fn name(&self) -> &'static str {
        "ransomware"
    }

    async fn detect(&self, record: &CanonicalRecord) -> PipelineResult<Option<Detection>> {
        let message = record.message.to_lowercase();
        let matches: Vec<String> = RANSOMWARE_PATTERNS
            .iter()
            .filter(|(_, pattern)| pattern.is_match(&message))
            .map(|(name, _)| name.to_string())
            .collect();

        if !matches.is_empty() {
            error!(indicators = matches.len(), "ransomware activity detected");
            let confidence = (matches.len() as f64 / 2.0).min(1.0);
            return Ok(Some(Detection {
                attack_type: AttackType::Ransomware,
                detector: self.name().to_string(),
                severity: Severity::Critical,
                confidence,
                indicators: matches,
                context: record
                    .source_ip()
                    .map(|ip| [("source_ip".to_string(), json!(ip.to_string()))].into())
                    .unwrap_or_default(),
            }));
        }

        // ML fallback for variants the patterns miss.
        if let Some(prediction) = record.ml_prediction.as_ref() {
            if prediction.attack_type == AttackType::Ransomware && prediction.confidence > 0.6 {
                return Ok(Some(Detection {
                    attack_type: AttackType::Ransomware,
                    detector: self.name().to_string(),
                    severity: Severity::Critical,
                    confidence: prediction.confidence,
                    indicators: vec!["ml_detected".to_string()],
                    context: Default::default(),
                }));
            }
        }

        Ok(None)
    }
}
