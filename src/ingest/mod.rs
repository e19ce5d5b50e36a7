//! Ingestion Module
//! ================
//! Format auto-detection and parsing of raw log lines, plus normalization
//! onto the canonical record schema.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

pub mod csv;
pub mod json;
pub mod normalizer;
pub mod syslog;
pub mod xml;

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::config::IngestConfig;

pub use normalizer::{CanonicalRecord, LogLevel, Normalizer};

/// A parsed but not yet normalized record
pub type ParsedRecord = Map<String, serde_json::Value>;

/// Identifier of a registered parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserId {
    Syslog,
    Json,
    Xml,
    Csv,
}

/// A log format parser. Parsers never fail loudly: unparseable input
/// yields `None` and the caller decides what to do with the line.
pub trait Parser: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap check whether this parser is likely to handle the line.
    fn can_parse(&self, raw: &str) -> bool;

    /// Parse the line. Caller-supplied metadata is merged last and wins.
    fn parse(&self, raw: &str, metadata: Option<&ParsedRecord>) -> Option<ParsedRecord>;
}

/// Merge caller-supplied metadata into a parsed record, overriding
/// colliding keys.
pub(crate) fn merge_metadata(parsed: &mut ParsedRecord, metadata: Option<&ParsedRecord>) {
    if let Some(metadata) = metadata {
        for (key, value) in metadata {
            parsed.insert(key.clone(), value.clone());
        }
    }
}

/// Registry of all format parsers with auto-detection.
///
/// Detection order: syslog (leading `<PRI>`), JSON, XML (leading `<` and
/// well-formed), CSV (contains the delimiter).
pub struct ParserRegistry {
    syslog: syslog::SyslogParser,
    json: json::JsonParser,
    xml: xml::XmlParser,
    csv: csv::CsvParser,
}

impl ParserRegistry {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            syslog: syslog::SyslogParser,
            json: json::JsonParser,
            xml: xml::XmlParser,
            csv: csv::CsvParser::new(config),
        }
    }

    /// Identify the format of a raw line, if any parser claims it.
    pub fn detect(&self, raw: &str) -> Option<ParserId> {
        if raw.trim().is_empty() {
            return None;
        }
        if self.syslog.can_parse(raw) {
            Some(ParserId::Syslog)
        } else if self.json.can_parse(raw) {
            Some(ParserId::Json)
        } else if self.xml.can_parse(raw) {
            Some(ParserId::Xml)
        } else if self.csv.can_parse(raw) {
            Some(ParserId::Csv)
        } else {
            None
        }
    }

    /// Parse a raw line, optionally with a format hint from the collector.
    pub fn parse(
        &self,
        raw: &str,
        hint: Option<ParserId>,
        metadata: Option<&ParsedRecord>,
    ) -> Option<ParsedRecord> {
        let id = hint.or_else(|| self.detect(raw))?;
        let parser: &dyn Parser = match id {
            ParserId::Syslog => &self.syslog,
            ParserId::Json => &self.json,
            ParserId::Xml => &self.xml,
            ParserId::Csv => &self.csv,
        };
        parser.parse(raw, metadata)
    }
}
