//! Pipeline Module
//! ===============
//! Per-record pipeline running parse → normalize → enrich → predict →
//! detect → automate → alert → filter → persist, plus the stream
//! coordinator pulling records off the ingestion bus with bounded
//! concurrency. A bad record never stalls the stream.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

pub mod aggregator;
pub mod bus;
pub mod filters;

use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Semaphore};
use tracing::{error, info, warn};

use crate::alerting::NotificationService;
use crate::audit::{AuditAction, AuditLogger};
use crate::automation::AutomationOrchestrator;
use crate::config::PipelineConfig;
use crate::detect::DetectionEngine;
use crate::enrich::EnricherChain;
use crate::error::{PipelineError, PipelineResult};
use crate::ingest::{CanonicalRecord, Normalizer, ParserRegistry};
use crate::metrics::{
    record_log_processed, record_ml_prediction, record_threat_detected, QUEUE_DEPTH,
};
use crate::ml::{EnsemblePredictor, FeatureExtractor};
use crate::storage::{DocStore, TimeSeriesRow, TimeSeriesStore};

pub use aggregator::TimeWindowAggregator;
pub use bus::{BusRecord, IngestBus, MemoryBus, TOPIC_LOGS, TOPIC_THREATS};
pub use filters::{FilterVerdict, RecordFilters};

const LOGS_COLLECTION: &str = "logs";

/// What happened to one raw line
#[derive(Debug)]
pub enum ProcessOutcome {
    Processed(Box<CanonicalRecord>),
    Filtered,
    Unparseable,
}

/// The per-record processing pipeline
pub struct LogPipeline {
    registry: ParserRegistry,
    normalizer: Normalizer,
    enrichers: EnricherChain,
    extractor: FeatureExtractor,
    predictor: Arc<EnsemblePredictor>,
    detectors: DetectionEngine,
    automation: Arc<AutomationOrchestrator>,
    notifier: Arc<NotificationService>,
    doc_store: Arc<dyn DocStore>,
    ts_store: Arc<dyn TimeSeriesStore>,
    audit: Arc<AuditLogger>,
    bus: Arc<dyn IngestBus>,
    filters: RecordFilters,
    aggregator: TimeWindowAggregator,
}

impl LogPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &PipelineConfig,
        enrichers: EnricherChain,
        predictor: Arc<EnsemblePredictor>,
        detectors: DetectionEngine,
        automation: Arc<AutomationOrchestrator>,
        notifier: Arc<NotificationService>,
        doc_store: Arc<dyn DocStore>,
        ts_store: Arc<dyn TimeSeriesStore>,
        audit: Arc<AuditLogger>,
        bus: Arc<dyn IngestBus>,
    ) -> Self {
        Self {
            registry: ParserRegistry::new(&config.ingest),
            normalizer: Normalizer::new(&config.ingest),
            enrichers,
            extractor: FeatureExtractor::new(),
            predictor,
            detectors,
            automation,
            notifier,
            doc_store,
            ts_store,
            audit,
            bus,
            filters: RecordFilters::new(&config.filters),
            aggregator: TimeWindowAggregator::new(config.ddos.window_seconds),
        }
    }

    pub fn automation(&self) -> &Arc<AutomationOrchestrator> {
        &self.automation
    }

    pub fn notifier(&self) -> &Arc<NotificationService> {
        &self.notifier
    }

    pub fn aggregator(&self) -> &TimeWindowAggregator {
        &self.aggregator
    }

    /// Run the full pipeline for one raw line. Persistence failure is the
    /// only error that propagates: it gates the bus commit so the record
    /// is replayed.
    pub async fn process_line(&self, raw: &str, source: &str) -> PipelineResult<ProcessOutcome> {
        let started = Instant::now();

        let Some(parsed) = self.registry.parse(raw, None, None) else {
            record_log_processed(source, "parse_error", started.elapsed().as_secs_f64());
            return Ok(ProcessOutcome::Unparseable);
        };
        let mut record = self.normalizer.normalize(parsed, raw, source);

        self.enrichers.run(&mut record).await;

        let ml_started = Instant::now();
        let features = self.extractor.extract(&record);
        let prediction = self.predictor.predict(&features);
        let ml_result = if prediction.is_threat { "threat" } else { "normal" };
        record_ml_prediction("ensemble", ml_result, ml_started.elapsed().as_secs_f64());
        if prediction.is_threat {
            warn!(
                attack_type = %prediction.attack_type,
                confidence = %format!("{:.2}", prediction.confidence),
                "model flagged record as threat"
            );
        }
        record.ml_prediction = Some(prediction);

        let detect_started = Instant::now();
        let detections = self.detectors.detect(&record).await;
        record.detections = detections;
        let detect_elapsed = detect_started.elapsed().as_secs_f64();
        for detection in &record.detections {
            record_threat_detected(
                detection.attack_type.as_str(),
                detection.severity.as_str(),
                detect_elapsed,
            );
        }

        // Automation and notification, one pass per detection. Reports are
        // surfaced on the record; alert failures never block the stream.
        for detection in record.detections.clone() {
            let report = self.automation.handle_threat(&detection).await;
            self.audit
                .log(
                    AuditAction::AutomationTriggered,
                    "pipeline",
                    detection.attack_type.as_str(),
                    json!({
                        "actions": report.actions.len(),
                        "approvals": report.approvals,
                        "errors": report.errors,
                    }),
                    report.success,
                    detection.source_ip(),
                )
                .await;
            record.automation = Some(report);

            self.notifier.send_threat_alert(&detection).await;
        }

        if self.filters.evaluate(&record) != FilterVerdict::Pass {
            record_log_processed(source, "filtered", started.elapsed().as_secs_f64());
            return Ok(ProcessOutcome::Filtered);
        }

        self.aggregator.observe(&record);
        self.persist(&record).await?;

        if !record.detections.is_empty() {
            let doc = serde_json::to_value(&record)
                .map_err(|e| PipelineError::Persistence(e.to_string()))?;
            if let Err(err) = self.bus.publish(TOPIC_THREATS, Some(&record.source), &doc).await {
                warn!(%err, "failed to publish threat record");
            }
        }

        record_log_processed(source, "processed", started.elapsed().as_secs_f64());
        Ok(ProcessOutcome::Processed(Box::new(record)))
    }

    async fn persist(&self, record: &CanonicalRecord) -> PipelineResult<()> {
        let doc =
            serde_json::to_value(record).map_err(|e| PipelineError::Persistence(e.to_string()))?;
        self.doc_store.insert(LOGS_COLLECTION, doc).await?;

        let metadata_json = serde_json::to_string(&record.metadata)
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;
        self.ts_store
            .insert(TimeSeriesRow {
                time: record.timestamp,
                source: record.source.clone(),
                host: record.host.clone(),
                level: record.level.as_str().to_string(),
                message: record.message.clone(),
                metadata_json,
            })
            .await
    }
}

/// Pulls records from the ingestion bus and drives the pipeline with a
/// bounded number of in-flight records
pub struct StreamCoordinator {
    pipeline: Arc<LogPipeline>,
    bus: Arc<dyn IngestBus>,
    workers: usize,
    in_flight: Arc<Semaphore>,
    drain_grace: Duration,
    shutdown: broadcast::Sender<()>,
}

impl StreamCoordinator {
    pub fn new(pipeline: Arc<LogPipeline>, bus: Arc<dyn IngestBus>, config: &PipelineConfig) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            pipeline,
            bus,
            workers: config.stream.workers,
            in_flight: Arc::new(Semaphore::new(config.stream.max_in_flight)),
            drain_grace: Duration::from_secs(config.stream.drain_grace_secs),
            shutdown,
        }
    }

    /// Root cancellation signal; clones propagate to every stage.
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Spawn the worker pool.
    pub fn start(&self) -> Vec<tokio::task::JoinHandle<()>> {
        info!(workers = self.workers, "stream coordinator starting");
        (0..self.workers)
            .map(|worker_id| {
                let pipeline = Arc::clone(&self.pipeline);
                let bus = Arc::clone(&self.bus);
                let in_flight = Arc::clone(&self.in_flight);
                let mut shutdown = self.shutdown.subscribe();
                tokio::spawn(async move {
                    loop {
                        let fetched = tokio::select! {
                            _ = shutdown.recv() => break,
                            fetched = bus.fetch() => fetched,
                        };

                        match fetched {
                            Ok(Some(record)) => {
                                // Backpressure: wait for an in-flight slot.
                                let Ok(_permit) = in_flight.acquire().await else {
                                    break;
                                };
                                QUEUE_DEPTH
                                    .with_label_values(&["ingest"])
                                    .set(in_flight.available_permits() as i64);

                                let source =
                                    record.key.as_deref().unwrap_or("unknown").to_string();
                                match pipeline.process_line(&record.payload, &source).await {
                                    Ok(_) => {
                                        // Commit only after persistence succeeded.
                                        if let Err(err) = bus.commit().await {
                                            error!(%err, "bus commit failed");
                                        }
                                    }
                                    Err(err) => {
                                        // Per-record isolation: log, skip commit,
                                        // let at-least-once delivery replay it.
                                        error!(worker_id, %err, "record processing failed");
                                    }
                                }
                            }
                            Ok(None) => {
                                info!(worker_id, "ingestion bus closed");
                                break;
                            }
                            Err(err) => {
                                error!(worker_id, %err, "bus fetch failed");
                                tokio::time::sleep(Duration::from_millis(250)).await;
                            }
                        }
                    }
                })
            })
            .collect()
    }

    /// Signal shutdown and drain in-flight records within the grace
    /// period.
    pub async fn shutdown(&self, handles: Vec<tokio::task::JoinHandle<()>>) {
        let _ = self.shutdown.send(());
        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(self.drain_grace, drain).await.is_err() {
            warn!("drain grace period elapsed with records still in flight");
        } else {
            info!("stream coordinator drained");
        }
    }
}
