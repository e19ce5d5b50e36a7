//! XML Log Parser
//! ==============
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value};

use crate::ingest::{merge_metadata, ParsedRecord, Parser};

/// Parser for XML formatted logs. Elements become nested maps; repeated
/// children with the same tag become lists.
#[derive(Debug, Default)]
pub struct XmlParser;

struct Element {
    map: Map<String, Value>,
    text: String,
}

impl Element {
    fn new() -> Self {
        Self {
            map: Map::new(),
            text: String::new(),
        }
    }

    fn into_value(self) -> Value {
        let text = self.text.trim();
        if self.map.is_empty() {
            return Value::String(text.to_string());
        }
        let mut map = self.map;
        if !text.is_empty() {
            map.insert("_text".to_string(), Value::String(text.to_string()));
        }
        Value::Object(map)
    }
}

/// Insert a child value, promoting repeated tags to lists.
fn insert_child(map: &mut Map<String, Value>, tag: String, value: Value) {
    match map.get_mut(&tag) {
        Some(Value::Array(list)) => list.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(tag, value);
        }
    }
}

fn parse_document(raw: &str) -> Option<Map<String, Value>> {
    let mut reader = Reader::from_str(raw);
    reader.trim_text(true);

    let mut stack: Vec<(String, Element)> = Vec::new();
    let mut root: Option<Map<String, Value>> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let tag = String::from_utf8_lossy(start.name().as_ref()).to_string();
                let mut element = Element::new();
                for attr in start.attributes().flatten() {
                    let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                    let value = attr.unescape_value().ok()?.to_string();
                    element.map.insert(key, Value::String(value));
                }
                stack.push((tag, element));
            }
            Ok(Event::Empty(start)) => {
                let tag = String::from_utf8_lossy(start.name().as_ref()).to_string();
                let mut element = Element::new();
                for attr in start.attributes().flatten() {
                    let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                    let value = attr.unescape_value().ok()?.to_string();
                    element.map.insert(key, Value::String(value));
                }
                match stack.last_mut() {
                    Some((_, parent)) => insert_child(&mut parent.map, tag, element.into_value()),
                    None => return None,
                }
            }
            Ok(Event::Text(text)) => {
                if let Some((_, element)) = stack.last_mut() {
                    element.text.push_str(&text.unescape().ok()?);
                }
            }
            Ok(Event::End(_)) => {
                let (tag, element) = stack.pop()?;
                match stack.last_mut() {
                    Some((_, parent)) => insert_child(&mut parent.map, tag, element.into_value()),
                    None => {
                        // Document root: flatten object roots, wrap scalar roots.
                        let value = element.into_value();
                        root = Some(match value {
                            Value::Object(map) => map,
                            other => {
                                let mut map = Map::new();
                                map.insert(tag, other);
                                map
                            }
                        });
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => return None,
        }
    }

    root
}

impl Parser for XmlParser {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn can_parse(&self, raw: &str) -> bool {
        raw.trim_start().starts_with('<') && parse_document(raw).is_some()
    }

    fn parse(&self, raw: &str, metadata: Option<&ParsedRecord>) -> Option<ParsedRecord> {
        let mut parsed = parse_document(raw)?;
        merge_metadata(&mut parsed, metadata);
        Some(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elements_become_map() {
        let parser = XmlParser;
        let parsed = parser
            .parse(
                "<event><level>ERROR</level><message>relay fault</message></event>",
                None,
            )
            .unwrap();
        assert_eq!(parsed.get("level").unwrap(), "ERROR");
        assert_eq!(parsed.get("message").unwrap(), "relay fault");
    }

    #[test]
    fn test_repeated_children_become_list() {
        let parser = XmlParser;
        let parsed = parser
            .parse("<event><tag>a</tag><tag>b</tag></event>", None)
            .unwrap();
        let tags = parsed.get("tag").unwrap().as_array().unwrap();
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn test_attributes_kept() {
        let parser = XmlParser;
        let parsed = parser
            .parse(r#"<event id="7"><message>m</message></event>"#, None)
            .unwrap();
        assert_eq!(parsed.get("id").unwrap(), "7");
    }

    #[test]
    fn test_rejects_malformed() {
        let parser = XmlParser;
        assert!(parser.parse("<event><open>", None).is_none());
        assert!(!parser.can_parse("plain text"));
    }
}
