//! Time-Window Aggregation
//! =======================
//! Sliding counters per level and source, backing the admin summary
//! surface.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;

use crate::ingest::CanonicalRecord;

#[derive(Debug, Clone, Serialize)]
pub struct WindowCounts {
    pub total: u64,
    pub by_level: std::collections::HashMap<String, u64>,
    pub by_source: std::collections::HashMap<String, u64>,
}

/// Sliding-window counters over observed records
pub struct TimeWindowAggregator {
    window: Duration,
    events: DashMap<(String, String), VecDeque<DateTime<Utc>>>,
}

impl TimeWindowAggregator {
    pub fn new(window_secs: u64) -> Self {
        Self {
            window: Duration::seconds(window_secs as i64),
            events: DashMap::new(),
        }
    }

    pub fn observe(&self, record: &CanonicalRecord) {
        let now = Utc::now();
        let key = (record.level.as_str().to_string(), record.source.clone());
        let mut entry = self.events.entry(key).or_default();
        entry.push_back(now);
        let cutoff = now - self.window;
        while matches!(entry.front(), Some(ts) if *ts <= cutoff) {
            entry.pop_front();
        }
    }

    pub fn counts(&self) -> WindowCounts {
        let cutoff = Utc::now() - self.window;
        let mut by_level = std::collections::HashMap::new();
        let mut by_source = std::collections::HashMap::new();
        let mut total = 0u64;

        for entry in self.events.iter() {
            let count = entry.value().iter().filter(|ts| **ts > cutoff).count() as u64;
            if count == 0 {
                continue;
            }
            let (level, source) = entry.key();
            *by_level.entry(level.clone()).or_insert(0) += count;
            *by_source.entry(source.clone()).or_insert(0) += count;
            total += count;
        }

        WindowCounts {
            total,
            by_level,
            by_source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(level: &str, source: &str) -> CanonicalRecord {
        let parsed = serde_json::from_str(&format!(
            r#"{{"message":"x","level":"{level}","source":"{source}"}}"#
        ))
        .unwrap();
        crate::ingest::Normalizer::new(&crate::config::IngestConfig::default())
            .normalize(parsed, "x", source)
    }

    #[test]
    fn test_counts_grouped() {
        let agg = TimeWindowAggregator::new(60);
        agg.observe(&record("ERROR", "syslog"));
        agg.observe(&record("ERROR", "syslog"));
        agg.observe(&record("INFO", "api"));

        let counts = agg.counts();
        assert_eq!(counts.total, 3);
        assert_eq!(counts.by_level["ERROR"], 2);
        assert_eq!(counts.by_source["api"], 1);
    }
}
