//! Network Intrusion Detector
//! ==========================
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use tracing::warn;

use crate::detect::{AttackType, Detection, Detector, Severity};
use crate::error::PipelineResult;
use crate::ingest::CanonicalRecord;

lazy_static! {
    static ref INTRUSION_PATTERNS: Vec<(&'static str, Regex)> = vec![
        // Port scanning
        ("port_scan", Regex::new(r"(?i)(port.?scan|scanning|probe)").unwrap()),
        ("connection_errors", Regex::new(r"(?i)(connection.?refused|connection.?timeout).*\d+").unwrap()),
        // Brute force
        ("auth_failures", Regex::new(r"(?i)(failed.?login|authentication.?failed).*\d+").unwrap()),
        ("brute_force", Regex::new(r"(?i)(brute.?force|password.?attack)").unwrap()),
        // Exploitation attempts
        ("exploit_attempt", Regex::new(r"(?i)(exploit|vulnerability|buffer.?overflow)").unwrap()),
        ("injection_attempt", Regex::new(r"(?i)(sql.?injection|xss|cross.?site)").unwrap()),
        // Unauthorized access
        ("unauthorized_access", Regex::new(r"(?i)(unauthorized.?access|intrusion|breach)").unwrap()),
        ("access_violation", Regex::new(r"(?i)(access.?violation|security.?breach)").unwrap()),
    ];
}

#[derive(Debug, Default)]
pub struct NetworkIntrusionDetector;

impl NetworkIntrusionDetector {
    fn context_for(record: &CanonicalRecord) -> std::collections::HashMap<String, serde_json::Value> {
        let mut context = std::collections::HashMap::new();
        if let Some(ip) = record.source_ip() {
            context.insert("source_ip".to_string(), json!(ip.to_string()));
        }
        if let Some(port) = record.port() {
            context.insert("port".to_string(), json!(port));
        }
        context
    }
}

#[async_trait]
impl Detector for NetworkIntrusionDetector {
    fn name(&self) -> &'static str {
        "network_intrusion"
    }

    async fn detect(&self, record: &CanonicalRecord) -> PipelineResult<Option<Detection>> {
        let message = record.message.to_lowercase();
        let matches: Vec<String> = INTRUSION_PATTERNS
            .iter()
            .filter(|(_, pattern)| pattern.is_match(&message))
            .map(|(name, _)| name.to_string())
            .collect();

        if !matches.is_empty() {
            warn!(indicators = matches.len(), "network intrusion detected");
            let confidence = (matches.len() as f64 / 3.0).min(1.0);
            return Ok(Some(Detection {
                attack_type: AttackType::NetworkIntrusion,
                detector: self.name().to_string(),
                severity: Severity::High,
                confidence,
                indicators: matches,
                context: Self::context_for(record),
            }));
        }

        // Threat-intel reputation hit counts as intrusion evidence.
        if let Some(intel) = record.threat_intel.as_ref() {
            if intel.is_malicious || intel.is_suspicious {
                return Ok(Some(Detection {
                    attack_type: AttackType::NetworkIntrusion,
                    detector: self.name().to_string(),
                    severity: Severity::High,
                    confidence: intel.confidence as f64 / 100.0,
                    indicators: intel.threat_types.clone(),
                    context: Self::context_for(record),
                }));
            }
        }

        if let Some(prediction) = record.ml_prediction.as_ref() {
            if prediction.attack_type == AttackType::NetworkIntrusion
                && prediction.confidence > 0.7
            {
                return Ok(Some(Detection {
                    attack_type: AttackType::NetworkIntrusion,
                    detector: self.name().to_string(),
                    severity: Severity::High,
                    confidence: prediction.confidence,
                    indicators: vec!["ml_detected".to_string()],
                    context: Self::context_for(record),
                }));
            }
        }

        Ok(None)
    }
}
