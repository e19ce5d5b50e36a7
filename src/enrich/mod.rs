//! Enrichment Module
//! =================
//! Context enrichers run sequentially over each canonical record in a
//! fixed order: GeoIP, threat intelligence, asset metadata. Each enricher
//! is idempotent; a failing enricher logs and is skipped, the record
//! proceeds.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

pub mod asset;
pub mod geoip;
pub mod threat_intel;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::error::PipelineResult;
use crate::ingest::CanonicalRecord;

/// A single enrichment step
#[async_trait]
pub trait Enricher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn enrich(&self, record: &mut CanonicalRecord) -> PipelineResult<()>;
}

/// Ordered chain of enrichers
pub struct EnricherChain {
    enrichers: Vec<Arc<dyn Enricher>>,
}

impl EnricherChain {
    pub fn new(enrichers: Vec<Arc<dyn Enricher>>) -> Self {
        Self { enrichers }
    }

    /// Run every enricher in order. Enrichment errors drop the field, not
    /// the record.
    pub async fn run(&self, record: &mut CanonicalRecord) {
        for enricher in &self.enrichers {
            if let Err(error) = enricher.enrich(record).await {
                warn!(enricher = enricher.name(), %error, "enrichment failed, continuing");
            }
        }
    }
}
