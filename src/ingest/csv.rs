//! CSV Log Parser
//! ==============
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use parking_lot::Mutex;
use serde_json::Value;

use crate::config::IngestConfig;
use crate::ingest::{merge_metadata, ParsedRecord, Parser};

/// Parser for CSV formatted logs with a configurable delimiter.
///
/// Column names come from the configuration when preset; otherwise the
/// first row seen is captured as the header and yields no record itself.
#[derive(Debug)]
pub struct CsvParser {
    delimiter: u8,
    fields: Mutex<Option<Vec<String>>>,
}

impl CsvParser {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            delimiter: config.csv_delimiter as u8,
            fields: Mutex::new(config.csv_fields.clone()),
        }
    }

    fn read_row(&self, raw: &str) -> Option<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(raw.as_bytes());
        let record = reader.records().next()?.ok()?;
        Some(record.iter().map(|f| f.trim().to_string()).collect())
    }
}

impl Parser for CsvParser {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn can_parse(&self, raw: &str) -> bool {
        raw.contains(self.delimiter as char)
    }

    fn parse(&self, raw: &str, metadata: Option<&ParsedRecord>) -> Option<ParsedRecord> {
        let row = self.read_row(raw)?;
        if row.is_empty() {
            return None;
        }

        let mut fields = self.fields.lock();
        let names = match fields.as_ref() {
            Some(names) => names.clone(),
            None => {
                // First row becomes the header.
                *fields = Some(row);
                return None;
            }
        };
        drop(fields);

        let mut parsed = ParsedRecord::new();
        for (name, value) in names.iter().zip(row) {
            parsed.insert(name.clone(), Value::String(value));
        }
        merge_metadata(&mut parsed, metadata);
        Some(parsed)
    }
}
