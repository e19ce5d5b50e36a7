//! Feature Extractor
//! =================
//! Deterministic mapping from a canonical record to a named numeric
//! feature map. Feature names are stable across invocations; model
//! consumers rely on column order, so the map is ordered.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use chrono::{Datelike, Timelike};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

use crate::enrich::geoip::AddressKind;
use crate::ingest::{CanonicalRecord, LogLevel};

lazy_static! {
    static ref SPECIAL_CHARS: Regex = Regex::new(r#"[!@#$%^&*(),.?":{}|<>]"#).unwrap();
    static ref DIGITS: Regex = Regex::new(r"\d").unwrap();
    static ref UPPERCASE: Regex = Regex::new(r"[A-Z]").unwrap();
    static ref URL: Regex = Regex::new(r"https?://").unwrap();
    static ref EMAIL: Regex =
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap();
}

/// Attack keyword families counted in the message text
const ATTACK_PATTERNS: [(&str, &[&str]); 5] = [
    ("sql_injection", &["union select", "drop table", "1=1", "or 1=1"]),
    ("xss", &["<script", "javascript:", "onerror="]),
    ("path_traversal", &["../", "..\\", "/etc/passwd"]),
    ("command_injection", &[";", "|", "&&", "`"]),
    ("brute_force", &["failed", "invalid", "unauthorized", "denied"]),
];

/// Ordered feature map keyed by stable feature names
pub type FeatureMap = BTreeMap<String, f64>;

/// Extract features from canonical records for the model ensemble
#[derive(Debug, Default, Clone)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, record: &CanonicalRecord) -> FeatureMap {
        let mut features = FeatureMap::new();
        self.statistical(record, &mut features);
        self.temporal(record, &mut features);
        self.network(record, &mut features);
        self.text(record, &mut features);
        features
    }

    /// Stable list of feature names, derived from a fixed probe record.
    pub fn feature_names(&self) -> Vec<String> {
        let parsed = serde_json::from_str(
            r#"{"message":"probe","timestamp":"2025-01-01T12:00:00Z","level":"INFO"}"#,
        )
        .unwrap();
        let record = crate::ingest::Normalizer::new(&crate::config::IngestConfig::default())
            .normalize(parsed, "probe", "probe");
        self.extract(&record).into_keys().collect()
    }

    fn statistical(&self, record: &CanonicalRecord, features: &mut FeatureMap) {
        features.insert("message_length".to_string(), record.message.len() as f64);
        features.insert(
            "message_word_count".to_string(),
            record.message.split_whitespace().count() as f64,
        );
        features.insert("metadata_count".to_string(), record.metadata.len() as f64);
    }

    fn temporal(&self, record: &CanonicalRecord, features: &mut FeatureMap) {
        let ts = record.timestamp;
        let hour = ts.hour();
        let weekday = ts.weekday().num_days_from_monday();
        features.insert("hour".to_string(), hour as f64);
        features.insert("day_of_week".to_string(), weekday as f64);
        features.insert("day_of_month".to_string(), ts.day() as f64);
        features.insert("month".to_string(), ts.month() as f64);
        features.insert("is_weekend".to_string(), if weekday >= 5 { 1.0 } else { 0.0 });
        features.insert(
            "is_business_hours".to_string(),
            if (9..=17).contains(&hour) { 1.0 } else { 0.0 },
        );
    }

    fn network(&self, record: &CanonicalRecord, features: &mut FeatureMap) {
        let ip = record.source_ip();
        features.insert("has_ip".to_string(), if ip.is_some() { 1.0 } else { 0.0 });
        let kind = ip.map(crate::enrich::geoip::classify_ip);
        features.insert(
            "is_private_ip".to_string(),
            if kind == Some(AddressKind::Private) { 1.0 } else { 0.0 },
        );
        features.insert(
            "is_multicast_ip".to_string(),
            if kind == Some(AddressKind::Multicast) { 1.0 } else { 0.0 },
        );
        features.insert(
            "is_reserved_ip".to_string(),
            if kind == Some(AddressKind::Reserved) { 1.0 } else { 0.0 },
        );

        let port = record.port();
        features.insert("has_port".to_string(), if port.is_some() { 1.0 } else { 0.0 });
        features.insert("port".to_string(), port.map(f64::from).unwrap_or(0.0));
        features.insert(
            "is_well_known_port".to_string(),
            match port {
                Some(p) if p < 1024 => 1.0,
                _ => 0.0,
            },
        );
        features.insert(
            "is_http_port".to_string(),
            match port {
                Some(80) | Some(443) | Some(8080) | Some(8443) => 1.0,
                _ => 0.0,
            },
        );
        features.insert(
            "is_ssh_port".to_string(),
            if port == Some(22) { 1.0 } else { 0.0 },
        );

        let protocol = record.protocol().unwrap_or("").to_ascii_uppercase();
        features.insert(
            "has_protocol".to_string(),
            if protocol.is_empty() { 0.0 } else { 1.0 },
        );
        for (name, needle) in [
            ("is_tcp", "TCP"),
            ("is_udp", "UDP"),
            ("is_http", "HTTP"),
            ("is_https", "HTTPS"),
        ] {
            features.insert(
                name.to_string(),
                if protocol.contains(needle) { 1.0 } else { 0.0 },
            );
        }

        features.insert(
            "has_geoip".to_string(),
            if record.geoip.is_some() { 1.0 } else { 0.0 },
        );
        features.insert(
            "is_private_geoip".to_string(),
            match record.geoip.as_ref() {
                Some(geo) if geo.kind == AddressKind::Private => 1.0,
                _ => 0.0,
            },
        );

        let intel = record.threat_intel.as_ref();
        features.insert(
            "has_threat_intel".to_string(),
            if intel.is_some() { 1.0 } else { 0.0 },
        );
        features.insert(
            "is_malicious".to_string(),
            if intel.map(|i| i.is_malicious).unwrap_or(false) { 1.0 } else { 0.0 },
        );
        features.insert(
            "is_suspicious".to_string(),
            if intel.map(|i| i.is_suspicious).unwrap_or(false) { 1.0 } else { 0.0 },
        );
        features.insert(
            "threat_confidence".to_string(),
            intel.map(|i| i.confidence as f64).unwrap_or(0.0),
        );
    }

    fn text(&self, record: &CanonicalRecord, features: &mut FeatureMap) {
        let message = record.message.to_lowercase();

        for (family, needles) in ATTACK_PATTERNS {
            let count = needles.iter().filter(|n| message.contains(**n)).count();
            features.insert(
                format!("has_{family}"),
                if count > 0 { 1.0 } else { 0.0 },
            );
            features.insert(format!("{family}_count"), count as f64);
        }

        features.insert(
            "has_special_chars".to_string(),
            if SPECIAL_CHARS.is_match(&record.message) { 1.0 } else { 0.0 },
        );
        features.insert(
            "has_numbers".to_string(),
            if DIGITS.is_match(&record.message) { 1.0 } else { 0.0 },
        );
        features.insert(
            "has_uppercase".to_string(),
            if UPPERCASE.is_match(&record.message) { 1.0 } else { 0.0 },
        );
        features.insert(
            "has_url".to_string(),
            if URL.is_match(&message) { 1.0 } else { 0.0 },
        );
        features.insert(
            "has_email".to_string(),
            if EMAIL.is_match(&record.message) { 1.0 } else { 0.0 },
        );

        let level = match record.level {
            LogLevel::Debug => 0.0,
            LogLevel::Info => 1.0,
            LogLevel::Warning => 2.0,
            LogLevel::Error => 3.0,
            LogLevel::Critical => 4.0,
        };
        features.insert("log_level".to_string(), level);
    }
}
