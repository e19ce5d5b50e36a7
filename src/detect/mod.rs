//! Detection Module
//! ================
//! Specialized attack detectors run concurrently over each enriched
//! record. Each detector owns its sliding per-key state; results are
//! ordered by severity, ties broken by registration order.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

pub mod apt;
pub mod ddos;
pub mod insider;
pub mod intrusion;
pub mod ransomware;
pub mod scada;
pub mod zero_day;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::PipelineResult;
use crate::ingest::CanonicalRecord;

/// Attack classes the pipeline can recognize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackType {
    Ddos,
    Ransomware,
    ScadaAttack,
    InsiderThreat,
    NetworkIntrusion,
    Apt,
    ZeroDay,
    Malware,
    Normal,
}

impl AttackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttackType::Ddos => "ddos",
            AttackType::Ransomware => "ransomware",
            AttackType::ScadaAttack => "scada_attack",
            AttackType::InsiderThreat => "insider_threat",
            AttackType::NetworkIntrusion => "network_intrusion",
            AttackType::Apt => "apt",
            AttackType::ZeroDay => "zero_day",
            AttackType::Malware => "malware",
            AttackType::Normal => "normal",
        }
    }
}

impl std::fmt::Display for AttackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detection severity, ordered low to critical
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier-style detector output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub attack_type: AttackType,
    pub detector: String,
    pub severity: Severity,
    pub confidence: f64,
    #[serde(default)]
    pub indicators: Vec<String>,
    #[serde(default)]
    pub context: HashMap<String, Value>,
}

impl Detection {
    pub fn source_ip(&self) -> Option<&str> {
        match self.context.get("source_ip").or_else(|| self.context.get("ip")) {
            Some(Value::String(ip)) => Some(ip),
            _ => None,
        }
    }

    pub fn user(&self) -> Option<&str> {
        match self.context.get("user") {
            Some(Value::String(user)) => Some(user),
            _ => None,
        }
    }

    pub fn port(&self) -> Option<u16> {
        self.context
            .get("port")
            .and_then(|v| v.as_u64())
            .and_then(|p| u16::try_from(p).ok())
    }

    pub fn protocol(&self) -> Option<&str> {
        match self.context.get("protocol") {
            Some(Value::String(proto)) => Some(proto),
            _ => None,
        }
    }
}

/// A stateful function from canonical record to detection (or none)
#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    fn enabled(&self) -> bool {
        true
    }

    async fn detect(&self, record: &CanonicalRecord) -> PipelineResult<Option<Detection>>;
}

/// Runs all enabled detectors concurrently and collects their results
pub struct DetectionEngine {
    detectors: Vec<Arc<dyn Detector>>,
}

impl DetectionEngine {
    pub fn new(detectors: Vec<Arc<dyn Detector>>) -> Self {
        let detectors: Vec<_> = detectors.into_iter().filter(|d| d.enabled()).collect();
        info!("initialized {} attack detectors", detectors.len());
        Self { detectors }
    }

    /// Fan out over all detectors; a failing detector drops only its own
    /// output. Results are sorted severity-descending, registration order
    /// within equal severity.
    pub async fn detect(&self, record: &CanonicalRecord) -> Vec<Detection> {
        let mut handles = Vec::with_capacity(self.detectors.len());
        for detector in &self.detectors {
            let detector = Arc::clone(detector);
            let record = record.clone();
            handles.push(tokio::spawn(async move {
                (detector.name(), detector.detect(&record).await)
            }));
        }

        let mut detections = Vec::new();
        for handle in handles {
            match handle.await {
                Ok((_, Ok(Some(detection)))) => detections.push(detection),
                Ok((_, Ok(None))) => {}
                Ok((name, Err(err))) => {
                    error!(detector = name, %err, "detector failed");
                }
                Err(err) => {
                    error!(%err, "detector task panicked");
                }
            }
        }

        // Stable sort keeps registration order within a severity class.
        detections.sort_by(|a, b| b.severity.cmp(&a.severity));

        if !detections.is_empty() {
            info!(count = detections.len(), "threats detected in record");
        }
        detections
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }
}
