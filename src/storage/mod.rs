//! Storage Module
//! ==============
//! Abstract interfaces over the persistent stores. The pipeline only ever
//! talks to these traits; the in-memory implementations back tests and
//! single-node development deployments.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{PipelineError, PipelineResult};

/// Document store used for normalized logs, threats, and audit records
#[async_trait]
pub trait DocStore: Send + Sync {
    async fn insert(&self, collection: &str, doc: Value) -> PipelineResult<()>;

    /// Find documents matching the filter. Dotted keys descend into
    /// nested objects and match against array elements.
    async fn find(
        &self,
        collection: &str,
        filter: &Value,
        sort_desc_by: Option<&str>,
        skip: usize,
        limit: usize,
    ) -> PipelineResult<Vec<Value>>;

    async fn count(&self, collection: &str, filter: &Value) -> PipelineResult<u64>;
}

/// One row in the time-series store. Metadata travels as encoded JSON,
/// never as a stringified debug representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeriesRow {
    pub time: DateTime<Utc>,
    pub source: String,
    pub host: String,
    pub level: String,
    pub message: String,
    pub metadata_json: String,
}

impl TimeSeriesRow {
    pub fn metadata(&self) -> PipelineResult<Value> {
        serde_json::from_str(&self.metadata_json)
            .map_err(|e| PipelineError::Persistence(e.to_string()))
    }
}

/// Time-series store for the metrics/query surface
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    async fn insert(&self, row: TimeSeriesRow) -> PipelineResult<()>;

    async fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        source: Option<&str>,
        limit: usize,
    ) -> PipelineResult<Vec<TimeSeriesRow>>;
}

/// Liveness probe exposed by every store
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &'static str;

    async fn healthy(&self) -> bool;
}

/// Match a document against a flat filter of `key == value` pairs.
/// Dotted keys traverse nested objects; arrays match any element.
fn matches_filter(doc: &Value, filter: &Value) -> bool {
    let Value::Object(conditions) = filter else {
        return true;
    };
    conditions
        .iter()
        .all(|(path, expected)| lookup_path(doc, path).iter().any(|v| *v == expected))
}

fn lookup_path<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![doc];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => {
                    if let Some(v) = map.get(segment) {
                        next.push(v);
                    }
                }
                Value::Array(list) => {
                    for item in list {
                        if let Some(v) = item.get(segment) {
                            next.push(v);
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    // Flatten arrays at the leaf so filters match elements.
    let mut leaves = Vec::new();
    for value in current {
        match value {
            Value::Array(list) => leaves.extend(list.iter()),
            other => leaves.push(other),
        }
    }
    leaves
}

/// In-memory document store
#[derive(Debug, Default)]
pub struct MemoryDocStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryDocStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocStore for MemoryDocStore {
    async fn insert(&self, collection: &str, doc: Value) -> PipelineResult<()> {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .push(doc);
        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Value,
        sort_desc_by: Option<&str>,
        skip: usize,
        limit: usize,
    ) -> PipelineResult<Vec<Value>> {
        let collections = self.collections.read();
        let mut docs: Vec<Value> = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| matches_filter(doc, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(field) = sort_desc_by {
            docs.sort_by(|a, b| {
                let av = a.get(field).map(|v| v.to_string()).unwrap_or_default();
                let bv = b.get(field).map(|v| v.to_string()).unwrap_or_default();
                bv.cmp(&av)
            });
        }

        Ok(docs.into_iter().skip(skip).take(limit).collect())
    }

    async fn count(&self, collection: &str, filter: &Value) -> PipelineResult<u64> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|doc| matches_filter(doc, filter)).count())
            .unwrap_or(0) as u64)
    }
}

#[async_trait]
impl HealthProbe for MemoryDocStore {
    fn name(&self) -> &'static str {
        "doc_store"
    }

    async fn healthy(&self) -> bool {
        true
    }
}

/// In-memory time-series store
#[derive(Debug, Default)]
pub struct MemoryTimeSeriesStore {
    rows: RwLock<Vec<TimeSeriesRow>>,
}

impl MemoryTimeSeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

#[async_trait]
impl TimeSeriesStore for MemoryTimeSeriesStore {
    async fn insert(&self, row: TimeSeriesRow) -> PipelineResult<()> {
        self.rows.write().push(row);
        Ok(())
    }

    async fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        source: Option<&str>,
        limit: usize,
    ) -> PipelineResult<Vec<TimeSeriesRow>> {
        let rows = self.rows.read();
        Ok(rows
            .iter()
            .filter(|r| r.time >= start && r.time <= end)
            .filter(|r| source.map(|s| r.source == s).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl HealthProbe for MemoryTimeSeriesStore {
    fn name(&self) -> &'static str {
        "timeseries_store"
    }

    async fn healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_find_count() {
        let store = MemoryDocStore::new();
        store
            .insert("logs", json!({"source":"a","level":"ERROR"}))
            .await
            .unwrap();
        store
            .insert("logs", json!({"source":"b","level":"INFO"}))
            .await
            .unwrap();

        let errors = store
            .find("logs", &json!({"level":"ERROR"}), None, 0, 10)
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["source"], "a");
        assert_eq!(store.count("logs", &json!({})).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dotted_filter_into_arrays() {
        let store = MemoryDocStore::new();
        store
            .insert(
                "logs",
                json!({"detections":[{"attack_type":"ddos"},{"attack_type":"apt"}]}),
            )
            .await
            .unwrap();
        store
            .insert("logs", json!({"detections":[{"attack_type":"ransomware"}]}))
            .await
            .unwrap();

        let hits = store
            .find("logs", &json!({"detections.attack_type":"apt"}), None, 0, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_timeseries_metadata_roundtrips_json() {
        let store = MemoryTimeSeriesStore::new();
        let metadata = json!({"facility": 4, "tag": "sshd"});
        store
            .insert(TimeSeriesRow {
                time: Utc::now(),
                source: "syslog".to_string(),
                host: "gw".to_string(),
                level: "ERROR".to_string(),
                message: "m".to_string(),
                metadata_json: serde_json::to_string(&metadata).unwrap(),
            })
            .await
            .unwrap();

        let rows = store
            .query(Utc::now() - chrono::Duration::minutes(1), Utc::now(), None, 10)
            .await
            .unwrap();
        assert_eq!(rows[0].metadata().unwrap(), metadata);
    }
}
