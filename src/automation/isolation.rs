//! Isolation Actuators
//! ===================
//! Network isolation behind a backend interface, plus the in-memory
//! quarantine and traffic-block books the pipeline owns. All operations
//! are idempotent: re-isolating an already-isolated target is a success.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::detect::Detection;
use crate::error::{PipelineError, PipelineResult};

/// Backend that actually blocks traffic at the network edge
#[async_trait]
pub trait NetworkIsolation: Send + Sync {
    /// Block the detection's source IP, optionally a specific port.
    async fn isolate(&self, detection: &Detection) -> PipelineResult<Value>;

    /// Lift a block previously applied for this IP.
    async fn release(&self, ip: &str) -> PipelineResult<()>;
}

/// In-memory isolation backend recording applied blocks
#[derive(Debug, Default)]
pub struct InMemoryIsolation {
    blocked_ips: DashMap<String, DateTime<Utc>>,
}

impl InMemoryIsolation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_blocked(&self, ip: &str) -> bool {
        self.blocked_ips.contains_key(ip)
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked_ips.len()
    }
}

#[async_trait]
impl NetworkIsolation for InMemoryIsolation {
    async fn isolate(&self, detection: &Detection) -> PipelineResult<Value> {
        let ip = detection
            .source_ip()
            .ok_or_else(|| PipelineError::Actuator("no source IP in detection".to_string()))?;

        let already = self.blocked_ips.contains_key(ip);
        self.blocked_ips.entry(ip.to_string()).or_insert_with(Utc::now);

        let mut actions = vec![format!("blocked IP {ip}")];
        if let Some(port) = detection.port() {
            let protocol = detection.protocol().unwrap_or("tcp");
            actions.push(format!("blocked port {port}/{protocol} for {ip}"));
        }

        info!(ip = %ip, already, "network isolation applied");
        Ok(json!({ "ip": ip, "actions": actions, "already_blocked": already }))
    }

    async fn release(&self, ip: &str) -> PipelineResult<()> {
        self.blocked_ips.remove(ip);
        info!(ip = %ip, "network isolation released");
        Ok(())
    }
}

/// Entry in the quarantine book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineEntry {
    pub device_id: String,
    pub reason: String,
    pub quarantined_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

/// Quarantine set keyed by device id
#[derive(Debug, Default)]
pub struct DeviceQuarantine {
    devices: DashMap<String, QuarantineEntry>,
}

impl DeviceQuarantine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quarantine a device. Quarantining an already-quarantined device is
    /// a no-op success; the original entry is kept.
    pub fn quarantine(
        &self,
        device_id: impl Into<String>,
        reason: impl Into<String>,
        metadata: Value,
    ) -> bool {
        let device_id = device_id.into();
        let already = self.devices.contains_key(&device_id);
        if !already {
            warn!(device = %device_id, "device quarantined");
            self.devices.insert(
                device_id.clone(),
                QuarantineEntry {
                    device_id,
                    reason: reason.into(),
                    quarantined_at: Utc::now(),
                    metadata,
                },
            );
        }
        true
    }

    pub fn release(&self, device_id: &str) -> bool {
        match self.devices.remove(device_id) {
            Some(_) => {
                info!(device = %device_id, "device released from quarantine");
                true
            }
            None => {
                warn!(device = %device_id, "device not in quarantine");
                false
            }
        }
    }

    pub fn is_quarantined(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    pub fn list(&self) -> Vec<QuarantineEntry> {
        self.devices.iter().map(|e| e.value().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.devices.len()
    }
}

/// Identity of a blocked flow
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockKey {
    pub src_ip: Option<String>,
    pub dst_ip: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<String>,
}

/// Entry in the traffic-block book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficBlock {
    pub key: BlockKey,
    pub reason: String,
    pub blocked_at: DateTime<Utc>,
}

/// Blocked-traffic set keyed by flow tuple
#[derive(Debug, Default)]
pub struct TrafficBlocking {
    blocks: DashMap<BlockKey, TrafficBlock>,
}

impl TrafficBlocking {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block a flow. Blocking an already-blocked flow is a no-op success.
    pub fn block(&self, key: BlockKey, reason: impl Into<String>) -> bool {
        if !self.blocks.contains_key(&key) {
            warn!(?key, "traffic blocked");
            self.blocks.insert(
                key.clone(),
                TrafficBlock {
                    key,
                    reason: reason.into(),
                    blocked_at: Utc::now(),
                },
            );
        }
        true
    }

    pub fn unblock(&self, key: &BlockKey) -> bool {
        match self.blocks.remove(key) {
            Some(_) => {
                info!(?key, "traffic unblocked");
                true
            }
            None => false,
        }
    }

    pub fn is_blocked(&self, key: &BlockKey) -> bool {
        self.blocks.contains_key(key)
    }

    pub fn list(&self) -> Vec<TrafficBlock> {
        self.blocks.iter().map(|e| e.value().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarantine_idempotent() {
        let quarantine = DeviceQuarantine::new();
        assert!(quarantine.quarantine("plc-7", "ransomware", json!({})));
        assert!(quarantine.quarantine("plc-7", "ransomware again", json!({})));
        assert_eq!(quarantine.count(), 1);
        // The first entry's reason is preserved.
        assert_eq!(quarantine.list()[0].reason, "ransomware");
        assert!(quarantine.is_quarantined("plc-7"));
    }

    #[test]
    fn test_release_unknown_device() {
        let quarantine = DeviceQuarantine::new();
        assert!(!quarantine.release("ghost"));
    }

    #[test]
    fn test_traffic_block_idempotent() {
        let blocking = TrafficBlocking::new();
        let key = BlockKey {
            src_ip: Some("10.0.0.1".to_string()),
            dst_ip: None,
            port: Some(502),
            protocol: Some("tcp".to_string()),
        };
        assert!(blocking.block(key.clone(), "ddos"));
        assert!(blocking.block(key.clone(), "ddos"));
        assert_eq!(blocking.count(), 1);
        assert!(blocking.unblock(&key));
        assert!(!blocking.is_blocked(&key));
    }

    #[tokio::test]
    async fn test_isolation_idempotent() {
        let isolation = InMemoryIsolation::new();
        let detection = Detection {
            attack_type: crate::detect::AttackType::Ddos,
            detector: "ddos".to_string(),
            severity: crate::detect::Severity::High,
            confidence: 0.9,
            indicators: vec![],
            context: [("source_ip".to_string(), json!("10.0.0.1"))].into(),
        };
        isolation.isolate(&detection).await.unwrap();
        let second = isolation.isolate(&detection).await.unwrap();
        assert_eq!(second["already_blocked"], json!(true));
        assert_eq!(isolation.blocked_count(), 1);
    }

    #[tokio::test]
    async fn test_isolation_without_ip_fails() {
        let isolation = InMemoryIsolation::new();
        let detection = Detection {
            attack_type: crate::detect::AttackType::InsiderThreat,
            detector: "insider_threat".to_string(),
            severity: crate::detect::Severity::High,
            confidence: 0.5,
            indicators: vec![],
            context: Default::default(),
        };
        assert!(isolation.isolate(&detection).await.is_err());
    }
}
