//! JSON Log Parser
//! ===============
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use serde_json::{Map, Value};

use crate::ingest::{merge_metadata, ParsedRecord, Parser};

/// Parser for JSON formatted logs. Accepts any parseable JSON value;
/// non-object values are wrapped as `{message, data}`.
#[derive(Debug, Default)]
pub struct JsonParser;

impl Parser for JsonParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn can_parse(&self, raw: &str) -> bool {
        serde_json::from_str::<Value>(raw).is_ok()
    }

    fn parse(&self, raw: &str, metadata: Option<&ParsedRecord>) -> Option<ParsedRecord> {
        let value = serde_json::from_str::<Value>(raw).ok()?;
        let mut parsed = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("message".to_string(), Value::String(raw.to_string()));
                map.insert("data".to_string(), other);
                map
            }
        };
        merge_metadata(&mut parsed, metadata);
        Some(parsed)
    }
}
