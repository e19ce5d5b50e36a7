//! SCADA Attack Detector
//! =====================
//! Only records touching an industrial protocol are inspected; the
//! protocol prefilter is an Aho-Corasick scan over protocol, service and
//! message text.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use aho_corasick::AhoCorasick;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use tracing::warn;

use crate::detect::{AttackType, Detection, Detector, Severity};
use crate::error::PipelineResult;
use crate::ingest::CanonicalRecord;

const SCADA_PROTOCOLS: [&str; 6] = ["modbus", "dnp3", "iec61850", "opc", "bacnet", "profinet"];

lazy_static! {
    static ref PROTOCOL_MATCHER: AhoCorasick = AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(SCADA_PROTOCOLS)
        .unwrap();
    static ref SCADA_ATTACK_PATTERNS: Vec<(&'static str, Regex)> = vec![
        // Unauthorized access
        ("unauthorized_scada_access", Regex::new(r"(?i)(unauthorized|forbidden).*(scada|ics|plc|hmi)").unwrap()),
        ("industrial_access_denied", Regex::new(r"(?i)(access.?denied).*(industrial|control)").unwrap()),
        // Command manipulation
        ("register_write", Regex::new(r"(?i)(write|modify).*(register|coil|holding)").unwrap()),
        ("setpoint_manipulation", Regex::new(r"(?i)(setpoint|control.?value).*(manipulation|change)").unwrap()),
        // Protocol violations
        ("protocol_violation", Regex::new(r"(?i)(invalid.?function.?code|illegal.?data.?address)").unwrap()),
        ("exception_response", Regex::new(r"(?i)(exception.?response|error.?code)").unwrap()),
        // Suspicious operations
        ("unauthorized_stop", Regex::new(r"(?i)(emergency.?stop|shutdown|reset).*(unauthorized)").unwrap()),
        ("safety_bypass", Regex::new(r"(?i)(bypass|override).*(safety|protection)").unwrap()),
    ];
}

#[derive(Debug, Default)]
pub struct ScadaDetector;

impl ScadaDetector {
    fn is_scada_record(record: &CanonicalRecord) -> bool {
        if let Some(protocol) = record.protocol() {
            if PROTOCOL_MATCHER.is_match(protocol) {
                return true;
            }
        }
        PROTOCOL_MATCHER.is_match(&record.service) || PROTOCOL_MATCHER.is_match(&record.message)
    }
}

#[async_trait]
impl Detector for ScadaDetector {
    fn name(&self) -> &'static str {
        "scada"
    }

    async fn detect(&self, record: &CanonicalRecord) -> PipelineResult<Option<Detection>> {
        if !Self::is_scada_record(record) {
            return Ok(None);
        }

        let message = record.message.to_lowercase();
        let matches: Vec<String> = SCADA_ATTACK_PATTERNS
            .iter()
            .filter(|(_, pattern)| pattern.is_match(&message))
            .map(|(name, _)| name.to_string())
            .collect();

        if !matches.is_empty() {
            warn!(indicators = matches.len(), "SCADA attack detected");
            let confidence = (matches.len() as f64 / 3.0).min(1.0);
            let mut context = std::collections::HashMap::new();
            if let Some(ip) = record.source_ip() {
                context.insert("source_ip".to_string(), json!(ip.to_string()));
            }
            if let Some(protocol) = record.protocol() {
                context.insert("protocol".to_string(), json!(protocol));
            }
            return Ok(Some(Detection {
                attack_type: AttackType::ScadaAttack,
                detector: self.name().to_string(),
                severity: Severity::Critical,
                confidence,
                indicators: matches,
                context,
            }));
        }

        if let Some(prediction) = record.ml_prediction.as_ref() {
            if prediction.attack_type == AttackType::ScadaAttack && prediction.confidence > 0.6 {
                return Ok(Some(Detection {
                    attack_type: AttackType::ScadaAttack,
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
