//! Threat Intelligence Enricher
//! ============================
//! Reputation lookups against runtime-mutable malicious and suspicious IP
//! sets. Readers see an immutable snapshot; updates clone and swap the
//! snapshot so the hot path never takes a write lock.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use async_trait::async_trait;
use bloom::{BloomFilter, ASMS};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::enrich::Enricher;
use crate::error::PipelineResult;
use crate::ingest::CanonicalRecord;

/// Threat intelligence attributes attached to a canonical record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatIntelInfo {
    pub ip: String,
    pub is_malicious: bool,
    pub is_suspicious: bool,
    pub threat_types: Vec<String>,
    /// 0, 50, or 100
    pub confidence: u8,
}

/// Immutable snapshot of the reputation sets with a bloom prefilter
struct IntelSets {
    malicious: HashSet<String>,
    suspicious: HashSet<String>,
    prefilter: BloomFilter,
}

impl IntelSets {
    fn build(malicious: HashSet<String>, suspicious: HashSet<String>) -> Self {
        let expected = (malicious.len() + suspicious.len()).max(64) as u32;
        let mut prefilter = BloomFilter::with_rate(0.01, expected);
        for ip in malicious.iter().chain(suspicious.iter()) {
            prefilter.insert(ip);
        }
        Self {
            malicious,
            suspicious,
            prefilter,
        }
    }
}

/// Enricher checking record IPs against the reputation sets
pub struct ThreatIntelEnricher {
    sets: RwLock<Arc<IntelSets>>,
}

impl ThreatIntelEnricher {
    pub fn new(malicious: impl IntoIterator<Item = String>, suspicious: impl IntoIterator<Item = String>) -> Self {
        Self {
            sets: RwLock::new(Arc::new(IntelSets::build(
                malicious.into_iter().collect(),
                suspicious.into_iter().collect(),
            ))),
        }
    }

    /// Look up an IP against the current snapshot.
    pub fn check(&self, ip: &str) -> ThreatIntelInfo {
        let sets = Arc::clone(&self.sets.read());

        let mut info = ThreatIntelInfo {
            ip: ip.to_string(),
            is_malicious: false,
            is_suspicious: false,
            threat_types: Vec::new(),
            confidence: 0,
        };

        // Bloom filter rules out the common case without touching the sets.
        if !sets.prefilter.contains(&ip.to_string()) {
            return info;
        }

        if sets.malicious.contains(ip) {
            info.is_malicious = true;
            info.threat_types.push("malicious_ip".to_string());
            info.confidence = 100;
        }
        if sets.suspicious.contains(ip) {
            info.is_suspicious = true;
            info.threat_types.push("suspicious_ip".to_string());
            info.confidence = info.confidence.max(50);
        }
        info
    }

    /// Add an IP to the malicious set.
    pub fn add_malicious(&self, ip: impl Into<String>) {
        let ip = ip.into();
        self.update(|malicious, _| {
            malicious.insert(ip.clone());
        });
        info!(ip = %ip, "added malicious IP");
    }

    /// Add an IP to the suspicious set.
    pub fn add_suspicious(&self, ip: impl Into<String>) {
        let ip = ip.into();
        self.update(|_, suspicious| {
            suspicious.insert(ip.clone());
        });
        info!(ip = %ip, "added suspicious IP");
    }

    /// Remove an IP from both sets.
    pub fn remove(&self, ip: &str) {
        self.update(|malicious, suspicious| {
            malicious.remove(ip);
            suspicious.remove(ip);
        });
        info!(ip = %ip, "removed IP from reputation sets");
    }

    pub fn counts(&self) -> (usize, usize) {
        let sets = self.sets.read();
        (sets.malicious.len(), sets.suspicious.len())
    }

    /// Copy-on-write update: clone the sets, mutate, rebuild the
    /// prefilter, swap the snapshot.
    fn update(&self, mutate: impl FnOnce(&mut HashSet<String>, &mut HashSet<String>)) {
        let mut guard = self.sets.write();
        let mut malicious = guard.malicious.clone();
        let mut suspicious = guard.suspicious.clone();
        mutate(&mut malicious, &mut suspicious);
        *guard = Arc::new(IntelSets::build(malicious, suspicious));
    }
}

#[async_trait]
impl Enricher for ThreatIntelEnricher {
    fn name(&self) -> &'static str {
        "threat_intel"
    }

    async fn enrich(&self, record: &mut CanonicalRecord) -> PipelineResult<()> {
        let Some(ip) = record.source_ip() else {
            return Ok(());
        };
        let info = self.check(&ip.to_string());
        if info.is_malicious || info.is_suspicious {
            warn!(ip = %info.ip, types = ?info.threat_types, "threat intel hit");
            record.threat_intel = Some(info);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malicious_hit() {
        let intel = ThreatIntelEnricher::new(vec!["203.0.113.9".to_string()], vec![]);
        let info = intel.check("203.0.113.9");
        assert!(info.is_malicious);
        assert_eq!(info.confidence, 100);
        assert_eq!(info.threat_types, vec!["malicious_ip"]);
    }

    #[test]
    fn test_suspicious_hit() {
        let intel = ThreatIntelEnricher::new(vec![], vec!["198.51.100.7".to_string()]);
        let info = intel.check("198.51.100.7");
        assert!(!info.is_malicious);
        assert!(info.is_suspicious);
        assert_eq!(info.confidence, 50);
    }

    #[test]
    fn test_clean_ip() {
        let intel = ThreatIntelEnricher::new(vec!["203.0.113.9".to_string()], vec![]);
        let info = intel.check("8.8.8.8");
        assert!(!info.is_malicious);
        assert!(!info.is_suspicious);
        assert_eq!(info.confidence, 0);
    }

    #[test]
    fn test_runtime_update_visible() {
        let intel = ThreatIntelEnricher::new(vec![], vec![]);
        assert!(!intel.check("203.0.113.9").is_malicious);
        intel.add_malicious("203.0.113.9");
        assert!(intel.check("203.0.113.9").is_malicious);
        intel.remove("203.0.113.9");
        assert!(!intel.check("203.0.113.9").is_malicious);
    }

    #[test]
    fn test_both_sets() {
        let intel = ThreatIntelEnricher::new(
            vec!["203.0.113.9".to_string()],
            vec!["203.0.113.9".to_string()],
        );
        let info = intel.check("203.0.113.9");
        assert!(info.is_malicious && info.is_suspicious);
        assert_eq!(info.confidence, 100);
        assert_eq!(info.threat_types.len(), 2);
    }
}
