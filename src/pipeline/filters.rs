//! Record Filters
//! ==============
//! Post-detection filters applied before persistence.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use crate::config::FilterConfig;
use crate::ingest::{CanonicalRecord, LogLevel};

/// Why a record was filtered out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Pass,
    BelowLevel,
    SourceBlocked,
}

pub struct RecordFilters {
    min_level: Option<LogLevel>,
    allowed_sources: Vec<String>,
    blocked_sources: Vec<String>,
}

impl RecordFilters {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            min_level: config.min_level.as_deref().map(LogLevel::from_text),
            allowed_sources: config.allowed_sources.clone(),
            blocked_sources: config.blocked_sources.clone(),
        }
    }

    /// Records carrying detections always pass; dropping a confirmed
    /// threat at the filter stage would hide it from the audit trail.
    pub fn evaluate(&self, record: &CanonicalRecord) -> FilterVerdict {
        if !record.detections.is_empty() {
            return FilterVerdict::Pass;
        }
        if let Some(min) = self.min_level {
            if record.level < min {
                return FilterVerdict::BelowLevel;
            }
        }
        if self.blocked_sources.iter().any(|s| *s == record.source) {
            return FilterVerdict::SourceBlocked;
        }
        if !self.allowed_sources.is_empty()
            && !self.allowed_sources.iter().any(|s| *s == record.source)
        {
            return FilterVerdict::SourceBlocked;
        }
        FilterVerdict::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{AttackType, Detection, Severity};

    fn record(level: &str, source: &str) -> CanonicalRecord {
        let parsed = serde_json::from_str(&format!(
            r#"{{"message":"x","level":"{level}","source":"{source}"}}"#
        ))
        .unwrap();
        crate::ingest::Normalizer::new(&crate::config::IngestConfig::default())
            .normalize(parsed, "x", source)
    }

    #[test]
    fn test_level_filter() {
        let filters = RecordFilters::new(&FilterConfig {
            min_level: Some("WARNING".to_string()),
            ..Default::default()
        });
        assert_eq!(filters.evaluate(&record("INFO", "a")), FilterVerdict::BelowLevel);
        assert_eq!(filters.evaluate(&record("ERROR", "a")), FilterVerdict::Pass);
    }

    #[test]
    fn test_source_filters() {
        let filters = RecordFilters::new(&FilterConfig {
            min_level: None,
            allowed_sources: vec!["scada".to_string()],
            blocked_sources: vec!["noise".to_string()],
        });
        assert_eq!(filters.evaluate(&record("INFO", "scada")), FilterVerdict::Pass);
        assert_eq!(
            filters.evaluate(&record("INFO", "noise")),
            FilterVerdict::SourceBlocked
        );
        assert_eq!(
            filters.evaluate(&record("INFO", "other")),
            FilterVerdict::SourceBlocked
        );
    }

    #[test]
    fn test_detections_bypass_filters() {
        let filters = RecordFilters::new(&FilterConfig {
            min_level: Some("CRITICAL".to_string()),
            ..Default::default()
        });
        let mut rec = record("INFO", "a");
        rec.detections.push(Detection {
            attack_type: AttackType::Ddos,
            detector: "ddos".to_string(),
            severity: Severity::High,
            confidence: 0.9,
            indicators: vec![],
            context: Default::default(),
        });
        assert_eq!(filters.evaluate(&rec), FilterVerdict::Pass);
    }
}
