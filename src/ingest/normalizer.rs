//! Log Normalizer
//! ==============
//! Maps heterogeneous parsed records onto the canonical record schema
//! shared by every downstream stage.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use chrono::{DateTime, Duration, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::net::IpAddr;

use crate::automation::ActionReport;
use crate::config::IngestConfig;
use crate::detect::Detection;
use crate::enrich::asset::AssetInfo;
use crate::enrich::geoip::GeoIpInfo;
use crate::enrich::threat_intel::ThreatIntelInfo;
use crate::ingest::ParsedRecord;
use crate::ml::ensemble::MlPrediction;

lazy_static! {
    static ref IP_IN_TEXT: Regex = Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap();
}

/// Canonical severity levels, with numeric syslog severities remapped
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Canonicalize a textual level; unknown text maps to INFO.
    pub fn from_text(text: &str) -> Self {
        match text.to_ascii_uppercase().as_str() {
            "DEBUG" | "TRACE" => LogLevel::Debug,
            "INFO" | "NOTICE" => LogLevel::Info,
            "WARN" | "WARNING" => LogLevel::Warning,
            "ERROR" | "ERR" => LogLevel::Error,
            "CRITICAL" | "CRIT" | "FATAL" | "ALERT" | "EMERGENCY" | "PANIC" => LogLevel::Critical,
            _ => LogLevel::Info,
        }
    }

    /// Remap a numeric syslog severity (0-7).
    pub fn from_syslog_severity(severity: u8) -> Self {
        match severity {
            0..=2 => LogLevel::Critical,
            3 => LogLevel::Error,
            4 => LogLevel::Warning,
            5 | 6 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

/// The normalized, enriched event passed between pipeline stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Stable identity for the query surface
    pub record_id: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub host: String,
    pub service: String,
    pub level: LogLevel,
    pub message: String,
    /// Original line preserved verbatim for replay
    pub raw: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geoip: Option<GeoIpInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threat_intel: Option<ThreatIntelInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<AssetInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml_prediction: Option<MlPrediction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detections: Vec<Detection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation: Option<ActionReport>,
}

const IP_FIELDS: [&str; 6] = ["ip", "ip_address", "src_ip", "dst_ip", "client_ip", "remote_addr"];
const USER_FIELDS: [&str; 4] = ["user", "username", "user_id", "account"];

impl CanonicalRecord {
    /// First valid IP among the well-known metadata fields, falling back to
    /// a regex scan of the message.
    pub fn source_ip(&self) -> Option<IpAddr> {
        for field in IP_FIELDS {
            if let Some(Value::String(candidate)) = self.metadata.get(field) {
                if let Ok(ip) = candidate.parse::<IpAddr>() {
                    return Some(ip);
                }
            }
        }
        IP_IN_TEXT
            .find_iter(&self.message)
            .find_map(|m| m.as_str().parse::<IpAddr>().ok())
    }

    /// User identity carried by the record, if any.
    pub fn user(&self) -> Option<&str> {
        for field in USER_FIELDS {
            if let Some(Value::String(user)) = self.metadata.get(field) {
                return Some(user);
            }
        }
        None
    }

    /// Port carried by the record, if any.
    pub fn port(&self) -> Option<u16> {
        for field in ["port", "src_port", "dst_port"] {
            match self.metadata.get(field) {
                Some(Value::Number(n)) => {
                    if let Some(port) = n.as_u64().and_then(|p| u16::try_from(p).ok()) {
                        return Some(port);
                    }
                }
                Some(Value::String(s)) => {
                    if let Ok(port) = s.parse::<u16>() {
                        return Some(port);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Protocol string carried by the record, if any.
    pub fn protocol(&self) -> Option<&str> {
        match self.metadata.get("protocol") {
            Some(Value::String(proto)) => Some(proto),
            _ => None,
        }
    }
}

/// Pure mapping from parsed records onto [`CanonicalRecord`]
#[derive(Debug, Clone)]
pub struct Normalizer {
    max_message_len: usize,
    max_drift: Duration,
}

impl Normalizer {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            max_message_len: config.max_message_len,
            max_drift: Duration::seconds(config.max_drift_secs),
        }
    }

    /// Normalize a parsed record. The raw line is preserved verbatim.
    pub fn normalize(&self, parsed: ParsedRecord, raw: &str, source: &str) -> CanonicalRecord {
        let timestamp = self.extract_timestamp(&parsed);
        let level = extract_level(&parsed);
        let message = self.extract_message(&parsed, raw);
        let host = first_string(&parsed, &["host", "hostname", "server"])
            .unwrap_or_else(|| "unknown".to_string());
        let service = first_string(&parsed, &["service", "app_name", "tag"])
            .unwrap_or_else(|| "unknown".to_string());
        let source = first_string(&parsed, &["source"]).unwrap_or_else(|| source.to_string());

        // Everything not consumed above is carried as metadata.
        let consumed = [
            "timestamp", "source", "host", "hostname", "server", "service", "app_name", "tag",
            "level", "severity", "log_level", "message", "text", "raw",
        ];
        let mut metadata = HashMap::new();
        for (key, value) in parsed {
            if !consumed.contains(&key.as_str()) {
                metadata.insert(key, value);
            }
        }

        CanonicalRecord {
            record_id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            source,
            host,
            service,
            level,
            message,
            raw: raw.to_string(),
            metadata,
            geoip: None,
            threat_intel: None,
            asset: None,
            ml_prediction: None,
            detections: Vec::new(),
            automation: None,
        }
    }

    fn extract_timestamp(&self, parsed: &ParsedRecord) -> DateTime<Utc> {
        let now = Utc::now();
        let candidate = match parsed.get("timestamp") {
            Some(Value::String(text)) => parse_timestamp_text(text),
            Some(Value::Number(n)) => n.as_f64().and_then(parse_epoch),
            _ => None,
        };
        match candidate {
            // Timestamps too far ahead of the wall clock are treated as skew.
            Some(ts) if ts - now <= self.max_drift => ts,
            _ => now,
        }
    }

    fn extract_message(&self, parsed: &ParsedRecord, raw: &str) -> String {
        let message = first_string(parsed, &["message", "text", "_text"])
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| {
                if raw.trim().is_empty() {
                    serde_json::to_string(parsed).unwrap_or_default()
                } else {
                    raw.to_string()
                }
            });
        let message = message.trim().to_string();
        if message.len() > self.max_message_len {
            let mut end = self.max_message_len;
            while !message.is_char_boundary(end) {
                end -= 1;
            }
            message[..end].to_string()
        } else {
            message
        }
    }
}

fn first_string(parsed: &ParsedRecord, fields: &[&str]) -> Option<String> {
    for field in fields {
        match parsed.get(*field) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

fn extract_level(parsed: &ParsedRecord) -> LogLevel {
    for field in ["level", "severity", "log_level"] {
        match parsed.get(field) {
            Some(Value::String(text)) => return LogLevel::from_text(text),
            Some(Value::Number(n)) => {
                if let Some(severity) = n.as_u64().and_then(|s| u8::try_from(s).ok()) {
                    return LogLevel::from_syslog_severity(severity);
                }
            }
            _ => {}
        }
    }
    LogLevel::Info
}

/// Accept ISO-8601 with or without a trailing `Z`, plus the common
/// space-separated variant.
fn parse_timestamp_text(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    let patterns = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y/%m/%d %H:%M:%S"];
    for pattern in patterns {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(text, pattern) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    text.parse::<f64>().ok().and_then(parse_epoch)
}

/// Numeric epoch with s/ms autodetection by magnitude.
fn parse_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    let millis = if value >= 1e12 { value } else { value * 1000.0 };
    Utc.timestamp_millis_opt(millis as i64).single()
}
