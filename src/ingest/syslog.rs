//! Syslog Parser
//! =============
//! RFC 5424 and RFC 3164 message parsing with `<PRI>` decomposition.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

use crate::ingest::{merge_metadata, ParsedRecord, Parser};

lazy_static! {
    // <PRI>TIMESTAMP HOSTNAME TAG: MESSAGE
    static ref RFC3164: Regex = Regex::new(
        r"^<(\d{1,3})>(\w{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})\s+(\S+)\s+([^:\s]+):\s*(.*)$"
    )
    .unwrap();
    // <PRI>VERSION TIMESTAMP HOSTNAME APP-NAME PROCID MSGID STRUCTURED-DATA MSG
    static ref RFC5424: Regex = Regex::new(
        r"^<(\d{1,3})>(\d+)\s+(\S+)\s+(\S+)\s+(\S+)\s+(\S+)\s+(\S+)\s+(\S+)\s+(.*)$"
    )
    .unwrap();
}

/// Parser for syslog messages, trying RFC 5424 before RFC 3164.
#[derive(Debug, Default)]
pub struct SyslogParser;

fn insert_priority(parsed: &mut ParsedRecord, pri: &str) {
    if let Ok(priority) = pri.parse::<u16>() {
        parsed.insert("priority".to_string(), json!(priority));
        parsed.insert("facility".to_string(), json!(priority / 8));
        parsed.insert("severity".to_string(), json!(priority % 8));
    }
}

impl Parser for SyslogParser {
    fn name(&self) -> &'static str {
        "syslog"
    }

    fn can_parse(&self, raw: &str) -> bool {
        raw.starts_with('<') && (RFC5424.is_match(raw) || RFC3164.is_match(raw))
    }

    fn parse(&self, raw: &str, metadata: Option<&ParsedRecord>) -> Option<ParsedRecord> {
        let mut parsed = ParsedRecord::new();

        if let Some(caps) = RFC5424.captures(raw) {
            parsed.insert("format".to_string(), Value::String("RFC5424".to_string()));
            insert_priority(&mut parsed, &caps[1]);
            if let Ok(version) = caps[2].parse::<u32>() {
                parsed.insert("version".to_string(), json!(version));
            }
            parsed.insert("timestamp".to_string(), Value::String(caps[3].to_string()));
            parsed.insert("hostname".to_string(), Value::String(caps[4].to_string()));
            parsed.insert("app_name".to_string(), Value::String(caps[5].to_string()));
            parsed.insert("proc_id".to_string(), Value::String(caps[6].to_string()));
            parsed.insert("msg_id".to_string(), Value::String(caps[7].to_string()));
            parsed.insert(
                "structured_data".to_string(),
                Value::String(caps[8].to_string()),
            );
            parsed.insert("message".to_string(), Value::String(caps[9].to_string()));
        } else if let Some(caps) = RFC3164.captures(raw) {
            parsed.insert("format".to_string(), Value::String("RFC3164".to_string()));
            insert_priority(&mut parsed, &caps[1]);
            parsed.insert("timestamp".to_string(), Value::String(caps[2].to_string()));
            parsed.insert("hostname".to_string(), Value::String(caps[3].to_string()));
            parsed.insert("tag".to_string(), Value::String(caps[4].to_string()));
            parsed.insert("message".to_string(), Value::String(caps[5].to_string()));
        } else {
            return None;
        }

        merge_metadata(&mut parsed, metadata);
        Some(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3164() {
        let parser = SyslogParser;
        let parsed = parser
            .parse(
                "<34>Oct 11 22:14:15 mymachine su: 'su root' failed for lonvick",
                None,
            )
            .unwrap();
        assert_eq!(parsed.get("format").unwrap(), "RFC3164");
        assert_eq!(parsed.get("hostname").unwrap(), "mymachine");
        assert_eq!(parsed.get("tag").unwrap(), "su");
        // PRI 34 = facility 4, severity 2
        assert_eq!(parsed.get("facility").unwrap(), 4);
        assert_eq!(parsed.get("severity").unwrap(), 2);
    }

    #[test]
    fn test_rfc5424() {
        let parser = SyslogParser;
        let parsed = parser
            .parse(
                "<165>1 2025-06-01T22:14:15.003Z scada-gw historian 812 ID47 - coil write rejected",
                None,
            )
            .unwrap();
        assert_eq!(parsed.get("format").unwrap(), "RFC5424");
        assert_eq!(parsed.get("hostname").unwrap(), "scada-gw");
        assert_eq!(parsed.get("app_name").unwrap(), "historian");
        assert_eq!(parsed.get("severity").unwrap(), 5);
        assert_eq!(parsed.get("message").unwrap(), "coil write rejected");
    }

    #[test]
    fn test_rejects_non_syslog() {
        let parser = SyslogParser;
        assert!(parser.parse("plain text line", None).is_none());
        assert!(!parser.can_parse("{\"json\":true}"));
    }
}
