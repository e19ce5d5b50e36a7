//! Asset Enricher
//! ==============
//! CMDB-style asset metadata lookup by hostname.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::enrich::Enricher;
use crate::error::PipelineResult;
use crate::ingest::CanonicalRecord;

/// Asset attributes attached to a canonical record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetInfo {
    pub hostname: String,
    pub asset_type: String,
    pub criticality: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl AssetInfo {
    fn unknown(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            asset_type: "unknown".to_string(),
            criticality: "medium".to_string(),
            department: None,
            owner: None,
        }
    }
}

/// In-memory asset inventory keyed by hostname
pub struct AssetInventory {
    assets: RwLock<HashMap<String, AssetInfo>>,
}

impl AssetInventory {
    pub fn new(assets: impl IntoIterator<Item = AssetInfo>) -> Self {
        Self {
            assets: RwLock::new(
                assets
                    .into_iter()
                    .map(|asset| (asset.hostname.clone(), asset))
                    .collect(),
            ),
        }
    }

    pub fn add(&self, asset: AssetInfo) {
        self.assets.write().insert(asset.hostname.clone(), asset);
    }

    /// Known entry, or the default unknown/medium entry.
    pub fn lookup(&self, hostname: &str) -> AssetInfo {
        self.assets
            .read()
            .get(hostname)
            .cloned()
            .unwrap_or_else(|| AssetInfo::unknown(hostname))
    }
}

#[async_trait]
impl Enricher for AssetInventory {
    fn name(&self) -> &'static str {
        "asset"
    }

    async fn enrich(&self, record: &mut CanonicalRecord) -> PipelineResult<()> {
        if record.host == "unknown" {
            return Ok(());
        }
        let host = record.host.clone();
        record.asset = Some(self.lookup(&host));
        debug!(host = %host, "asset attributes attached");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_asset() {
        let inventory = AssetInventory::new(vec![AssetInfo {
            hostname: "plc-7".to_string(),
            asset_type: "plc".to_string(),
            criticality: "critical".to_string(),
            department: Some("substation-ops".to_string()),
            owner: None,
        }]);
        let asset = inventory.lookup("plc-7");
        assert_eq!(asset.asset_type, "plc");
        assert_eq!(asset.criticality, "critical");
    }

    #[test]
    fn test_unknown_asset_defaults() {
        let inventory = AssetInventory::new(vec![]);
        let asset = inventory.lookup("mystery-host");
        assert_eq!(asset.asset_type, "unknown");
        assert_eq!(asset.criticality, "medium");
    }
}
