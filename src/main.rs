//! GridShield Node
//! ===============
//! Main entry point for the GridShield pipeline daemon. Acts as the
//! composition root: every manager is constructed here and injected, no
//! process-wide mutable globals.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::fmt::format::json;

use gridshield::alerting::channels::{HttpChatSink, HttpWebhookSink};
use gridshield::alerting::{
    AlertManager, ChatSink, EscalationManager, NotificationService, WebhookSink,
};
use gridshield::api::{ApiGateway, AppState};
use gridshield::audit::AuditLogger;
use gridshield::automation::{
    ApprovalWorkflow, AutomationOrchestrator, BackupKind, DeviceQuarantine,
    InMemoryBackupActivator, InMemoryIsolation, TrafficBlocking,
};
use gridshield::config::PipelineConfig;
use gridshield::detect::{
    apt::AptDetector, ddos::DdosDetector, insider::InsiderDetector,
    intrusion::NetworkIntrusionDetector, ransomware::RansomwareDetector, scada::ScadaDetector,
    zero_day::ZeroDayDetector, DetectionEngine, Detector,
};
use gridshield::enrich::asset::AssetInventory;
use gridshield::enrich::geoip::{GeoIpEnricher, MaxmindGeoDb};
use gridshield::enrich::threat_intel::ThreatIntelEnricher;
use gridshield::enrich::{Enricher, EnricherChain};
use gridshield::metrics::{init_metrics, update_system_metrics};
use gridshield::ml::ensemble::ZScoreAnomalyModel;
use gridshield::ml::EnsemblePredictor;
use gridshield::pipeline::{IngestBus, LogPipeline, MemoryBus, StreamCoordinator};
use gridshield::storage::{HealthProbe, MemoryDocStore, MemoryTimeSeriesStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Structured JSON logging
    tracing_subscriber::fmt()
        .event_format(json())
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    init_metrics();
    info!("Prometheus metrics initialized");

    info!("Starting GridShield Node v{}", env!("CARGO_PKG_VERSION"));

    // Configuration
    let config = match std::env::var("GRIDSHIELD_CONFIG") {
        Ok(path) => PipelineConfig::load(&path)?,
        Err(_) => {
            let config = PipelineConfig::default();
            config.validate()?;
            config
        }
    };

    // Stores
    let doc_store = Arc::new(MemoryDocStore::new());
    let ts_store = Arc::new(MemoryTimeSeriesStore::new());
    let audit = Arc::new(AuditLogger::new(doc_store.clone()));

    // Enrichment chain: GeoIP, threat intel, asset metadata
    let geodb = match std::env::var("GRIDSHIELD_GEOIP_DB") {
        Ok(path) => match MaxmindGeoDb::open(&path) {
            Ok(db) => Some(Box::new(db) as Box<dyn gridshield::enrich::geoip::GeoDb>),
            Err(err) => {
                warn!(%err, "GeoIP database unavailable, continuing without lookups");
                None
            }
        },
        Err(_) => None,
    };
    let intel = Arc::new(ThreatIntelEnricher::new(Vec::new(), Vec::new()));
    let assets = Arc::new(AssetInventory::new(Vec::new()));
    let enrichers = EnricherChain::new(vec![
        Arc::new(GeoIpEnricher::new(geodb)),
        intel.clone() as Arc<dyn Enricher>,
        assets.clone() as Arc<dyn Enricher>,
    ]);

    // Model ensemble; the anomaly baseline trains itself on traffic
    let anomaly = Arc::new(ZScoreAnomalyModel::new(10_000, 100, 3.0));
    let predictor = Arc::new(EnsemblePredictor::new(Some(anomaly), None));

    // Detector fan-out
    let detectors = DetectionEngine::new(vec![
        Arc::new(DdosDetector::new(&config.ddos)) as Arc<dyn Detector>,
        Arc::new(ScadaDetector),
        Arc::new(InsiderDetector::new(&config.insider)),
        Arc::new(NetworkIntrusionDetector),
        Arc::new(AptDetector::new(&config.apt)),
        Arc::new(RansomwareDetector),
        Arc::new(ZeroDayDetector::new(&config.zero_day)),
    ]);

    // Automation orchestrator with in-memory actuators
    let approvals = Arc::new(ApprovalWorkflow::new(&config.approval));
    let automation = Arc::new(AutomationOrchestrator::new(
        Arc::new(InMemoryIsolation::new()),
        Arc::new(DeviceQuarantine::new()),
        Arc::new(TrafficBlocking::new()),
        Arc::new(InMemoryBackupActivator::new(
            [("default".to_string(), BackupKind::DnsSwitch)].into(),
        )),
        approvals.clone(),
        &config.circuit_breaker,
        &config.stream,
    ));

    // Alerting
    let alert_manager = Arc::new(AlertManager::new(
        config.alerting.dedup_window_secs,
        config.alerting.max_history,
    ));
    let webhook = if config.notification.webhook_urls.is_empty() {
        None
    } else {
        Some(Arc::new(HttpWebhookSink::new(
            config.notification.webhook_urls.clone(),
            Duration::from_secs(config.notification.webhook_timeout_secs),
        )?) as Arc<dyn WebhookSink>)
    };
    let chat = match &config.notification.chat_webhook_url {
        Some(url) => Some(Arc::new(HttpChatSink::new(
            url.clone(),
            config.notification.chat_channel.clone(),
            Duration::from_secs(config.notification.webhook_timeout_secs),
        )?) as Arc<dyn ChatSink>),
        None => None,
    };
    let notifier = Arc::new(NotificationService::new(
        alert_manager,
        EscalationManager::new(&config.escalation),
        &config.notification,
        None,
        chat,
        webhook,
    ));

    // Ingestion bus and pipeline
    let bus = Arc::new(MemoryBus::new(config.stream.max_in_flight * 4));
    let pipeline = Arc::new(LogPipeline::new(
        &config,
        enrichers,
        predictor,
        detectors,
        automation,
        notifier.clone(),
        doc_store.clone(),
        ts_store.clone(),
        audit.clone(),
        bus.clone() as Arc<dyn IngestBus>,
    ));

    let coordinator = StreamCoordinator::new(pipeline.clone(), bus.clone(), &config);
    let workers = coordinator.start();
    let shutdown = coordinator.shutdown_sender();

    // Approval expiry sweeper
    let _sweeper = approvals.spawn_sweeper(shutdown.subscribe());

    // Escalation sweep
    let escalation_notifier = notifier.clone();
    let mut escalation_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            tokio::select! {
                _ = escalation_shutdown.recv() => break,
                _ = interval.tick() => {
                    escalation_notifier.run_escalation_sweep().await;
                }
            }
        }
    });

    // System metrics refresh
    tokio::spawn(async {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            update_system_metrics();
        }
    });

    // API gateway
    let probe_list: Vec<Arc<dyn HealthProbe>> = vec![doc_store.clone(), ts_store.clone()];
    let probes = Arc::new(probe_list);
    let state = AppState {
        pipeline: pipeline.clone(),
        doc_store,
        audit,
        intel,
        probes,
        auth_token: config.api.auth_token.clone(),
    };
    let gateway = ApiGateway::new(state);
    let bind_addr = config.api.bind_addr.clone();
    let _api_handle = tokio::spawn(async move {
        if let Err(e) = gateway.serve(&bind_addr).await {
            warn!("API gateway error: {}", e);
        }
    });

    info!("GridShield Node initialized successfully");
    info!("API gateway available on http://{}", config.api.bind_addr);
    info!("Detector fan-out active");

    // Run until interrupted, then drain in-flight records.
    signal::ctrl_c().await?;
    info!("shutdown signal received, draining");
    coordinator.shutdown(workers).await;

    Ok(())
}
