//! End-to-end test suite for the GridShield pipeline
//!
//! Exercises the full record path (parse → normalize → enrich → predict →
//! detect → automate → alert → persist) plus the stream coordinator,
//! against the in-memory stores and actuators.

use std::sync::Arc;
use std::time::Duration;

use gridshield::alerting::channels::MemoryWebhookSink;
use gridshield::alerting::{AlertManager, EscalationManager, NotificationService, SendResult};
use gridshield::audit::AuditLogger;
use gridshield::automation::{
    ActionOutcome, ActionType, ApprovalWorkflow, AutomationOrchestrator, BackupKind,
    DeviceQuarantine, InMemoryBackupActivator, InMemoryIsolation, TrafficBlocking,
};
use gridshield::config::PipelineConfig;
use gridshield::detect::{
    apt::AptDetector, ddos::DdosDetector, insider::InsiderDetector,
    intrusion::NetworkIntrusionDetector, ransomware::RansomwareDetector, scada::ScadaDetector,
    zero_day::ZeroDayDetector, AttackType, DetectionEngine, Detector, Severity,
};
use gridshield::enrich::asset::AssetInventory;
use gridshield::enrich::geoip::GeoIpEnricher;
use gridshield::enrich::threat_intel::ThreatIntelEnricher;
use gridshield::enrich::{Enricher, EnricherChain};
use gridshield::ml::EnsemblePredictor;
use gridshield::pipeline::{
    IngestBus, LogPipeline, MemoryBus, ProcessOutcome, StreamCoordinator, TOPIC_THREATS,
};
use gridshield::storage::{DocStore, MemoryDocStore, MemoryTimeSeriesStore};

struct Harness {
    pipeline: Arc<LogPipeline>,
    bus: Arc<MemoryBus>,
    webhook: Arc<MemoryWebhookSink>,
    doc_store: Arc<MemoryDocStore>,
    ts_store: Arc<MemoryTimeSeriesStore>,
    isolation: Arc<InMemoryIsolation>,
    quarantine: Arc<DeviceQuarantine>,
    config: PipelineConfig,
}

fn build(config: PipelineConfig) -> Harness {
    let doc_store = Arc::new(MemoryDocStore::new());
    let ts_store = Arc::new(MemoryTimeSeriesStore::new());
    let audit = Arc::new(AuditLogger::new(doc_store.clone()));

    let intel = Arc::new(ThreatIntelEnricher::new(Vec::new(), Vec::new()));
    let enrichers = EnricherChain::new(vec![
        Arc::new(GeoIpEnricher::new(None)),
        intel as Arc<dyn Enricher>,
        Arc::new(AssetInventory::new(Vec::new())) as Arc<dyn Enricher>,
    ]);

    let predictor = Arc::new(EnsemblePredictor::new(None, None));

    let detectors = DetectionEngine::new(vec![
        Arc::new(DdosDetector::new(&config.ddos)) as Arc<dyn Detector>,
        Arc::new(ScadaDetector),
        Arc::new(InsiderDetector::new(&config.insider)),
        Arc::new(NetworkIntrusionDetector),
        Arc::new(AptDetector::new(&config.apt)),
        Arc::new(RansomwareDetector),
        Arc::new(ZeroDayDetector::new(&config.zero_day)),
    ]);

    let isolation = Arc::new(InMemoryIsolation::new());
    let quarantine = Arc::new(DeviceQuarantine::new());
    let blocking = Arc::new(TrafficBlocking::new());
    let approvals = Arc::new(ApprovalWorkflow::new(&config.approval));
    let automation = Arc::new(AutomationOrchestrator::new(
        isolation.clone(),
        quarantine.clone(),
        blocking,
        Arc::new(InMemoryBackupActivator::new(
            [("default".to_string(), BackupKind::Direct)].into(),
        )),
        approvals,
        &config.circuit_breaker,
        &config.stream,
    ));

    let webhook = Arc::new(MemoryWebhookSink::new());
    let notifier = Arc::new(NotificationService::new(
        Arc::new(AlertManager::new(
            config.alerting.dedup_window_secs,
            config.alerting.max_history,
        )),
        EscalationManager::new(&config.escalation),
        &config.notification,
        None,
        None,
        Some(webhook.clone()),
    ));

    let bus = Arc::new(MemoryBus::new(256));
    let pipeline = Arc::new(LogPipeline::new(
        &config,
        enrichers,
        predictor,
        detectors,
        automation,
        notifier,
        doc_store.clone(),
        ts_store.clone(),
        audit,
        bus.clone() as Arc<dyn IngestBus>,
    ));

    Harness {
        pipeline,
        bus,
        webhook,
        doc_store,
        ts_store,
        isolation,
        quarantine,
        config,
    }
}

fn default_harness() -> Harness {
    build(PipelineConfig::default())
}

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn test_ddos_trip_end_to_end() {
        let harness = default_harness();
        let line = r#"{"message":"GET /telemetry","src_ip":"10.0.0.1","protocol":"tcp"}"#;

        let mut last = None;
        for _ in 0..120 {
            last = Some(
                harness
                    .pipeline
                    .process_line(line, "flood-test")
                    .await
                    .unwrap(),
            );
        }

        let ProcessOutcome::Processed(record) = last.unwrap() else {
            panic!("final record must be processed");
        };

        let ddos = record
            .detections
            .iter()
            .find(|d| d.attack_type == AttackType::Ddos)
            .expect("120 requests inside the window must trip the DDoS detector");
        assert_eq!(ddos.severity, Severity::High);
        let rps = ddos.context["requests_per_second"].as_f64().unwrap();
        assert!((rps - 2.0).abs() < 0.05, "rps was {rps}");
        assert!((ddos.confidence - 0.6).abs() < 0.02);

        // Traffic blocking executed without an operator in the loop.
        let report = record.automation.as_ref().unwrap();
        let blocking = report
            .actions
            .iter()
            .find(|a| a.action == ActionType::TrafficBlocking)
            .unwrap();
        assert!(blocking.auto_approved);
        assert!(matches!(blocking.outcome, ActionOutcome::Executed { .. }));

        // The blocked-traffic book holds exactly one entry despite the
        // repeated detections: re-blocking the same flow is a no-op.
        assert_eq!(harness.pipeline.automation().blocking().count(), 1);

        // Threat records were published for downstream consumers.
        assert!(!harness.bus.published(TOPIC_THREATS).is_empty());
    }

    #[tokio::test]
    async fn test_ransomware_pattern_to_failover() {
        let harness = default_harness();
        let line = r#"{"message":"encrypt files .locked readme.txt decrypt instructions","host":"historian-2"}"#;

        let outcome = harness.pipeline.process_line(line, "edr").await.unwrap();
        let ProcessOutcome::Processed(record) = outcome else {
            panic!("expected processed record");
        };

        let detection = record
            .detections
            .iter()
            .find(|d| d.attack_type == AttackType::Ransomware)
            .expect("ransom-note message must be detected");
        assert_eq!(detection.severity, Severity::Critical);

        let report = record.automation.as_ref().unwrap();
        let failover = report
            .actions
            .iter()
            .find(|a| a.action == ActionType::Failover)
            .expect("ransomware policy includes failover");
        assert!(failover.auto_approved);
        assert!(matches!(failover.outcome, ActionOutcome::Executed { .. }));
        assert!(report.success);
    }

    #[tokio::test]
    async fn test_insider_after_hours_requires_approval() {
        let harness = default_harness();
        let line = r#"{"message":"failed login","user":"alice","timestamp":"2025-06-02T02:00:00Z"}"#;

        let mut detected = None;
        for _ in 0..5 {
            if let ProcessOutcome::Processed(record) =
                harness.pipeline.process_line(line, "auth").await.unwrap()
            {
                if !record.detections.is_empty() {
                    detected = Some(record);
                }
            }
        }

        let record = detected.expect("fifth event must produce a detection");
        let insider = record
            .detections
            .iter()
            .find(|d| d.attack_type == AttackType::InsiderThreat)
            .unwrap();
        assert!(insider.indicators.contains(&"unusual_hours".to_string()));
        assert!(insider
            .indicators
            .contains(&"multiple_failed_access".to_string()));

        // Quarantine waits for an operator; nothing has been executed.
        let report = record.automation.as_ref().unwrap();
        assert!(!report.approvals.is_empty());
        assert_eq!(harness.quarantine.count(), 0);

        let approvals = harness.pipeline.automation().approvals();
        let pending = approvals.pending();
        let quarantine_request = pending
            .iter()
            .find(|r| r.action == ActionType::DeviceQuarantine)
            .expect("device quarantine must await approval");

        // Operator approves; the action executes on the operator path.
        approvals
            .approve(&quarantine_request.id, "operator", None)
            .unwrap();
        let executed = harness
            .pipeline
            .automation()
            .execute_approved(&quarantine_request.id)
            .await
            .unwrap();
        assert!(matches!(executed.outcome, ActionOutcome::Executed { .. }));
        assert!(harness.quarantine.is_quarantined("alice"));
    }

    #[tokio::test]
    async fn test_approval_expiry() {
        let mut config = PipelineConfig::default();
        config.approval.auto_approve_timeout_secs = 1;
        let harness = build(config);

        let line = r#"{"message":"failed login export copy","user":"mallory","timestamp":"2025-06-02T14:00:00Z"}"#;
        let ProcessOutcome::Processed(record) =
            harness.pipeline.process_line(line, "auth").await.unwrap()
        else {
            panic!("expected processed record");
        };
        let report = record.automation.as_ref().unwrap();
        let approval_id = report.approvals.first().expect("approval created").clone();

        tokio::time::sleep(Duration::from_secs(2)).await;

        let approvals = harness.pipeline.automation().approvals();
        let err = approvals.approve(&approval_id, "op", None).unwrap_err();
        assert_eq!(err.code(), "expired");
        assert!(approvals.pending().iter().all(|r| r.id != approval_id));
    }

    #[tokio::test]
    async fn test_alert_dedup_suppression() {
        let harness = default_harness();
        let notifier = harness.pipeline.notifier();

        let first = notifier
            .send_alert("X", "Y", Severity::High, "test", Default::default(), None)
            .await;
        assert!(first.succeeded());

        let second = notifier
            .send_alert("X", "Y", Severity::High, "test", Default::default(), None)
            .await;
        assert!(matches!(second, SendResult::Duplicate));
        assert_eq!(harness.webhook.posts().len(), 1);
    }
}

mod stream {
    use super::*;

    #[tokio::test]
    async fn test_bad_record_does_not_stall_stream() {
        let harness = default_harness();
        let coordinator = StreamCoordinator::new(
            harness.pipeline.clone(),
            harness.bus.clone(),
            &harness.config,
        );

        harness
            .bus
            .push(Some("mixed"), "complete garbage with no structure at all")
            .await
            .unwrap();
        harness
            .bus
            .push(Some("mixed"), r#"{"message":"valid record","level":"ERROR"}"#)
            .await
            .unwrap();
        harness
            .bus
            .push(
                Some("mixed"),
                "<34>Oct 11 22:14:15 gw sshd: Failed password for root",
            )
            .await
            .unwrap();

        let workers = coordinator.start();
        tokio::time::sleep(Duration::from_millis(300)).await;
        coordinator.shutdown(workers).await;

        // Both parseable records were persisted; the garbage line was
        // dropped without killing a worker.
        let stored = harness
            .doc_store
            .find("logs", &serde_json::json!({}), None, 0, 100)
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(harness.ts_store.len(), 2);
    }

    #[tokio::test]
    async fn test_syslog_record_normalized_through_stream() {
        let harness = default_harness();
        let line = "<34>Oct 11 22:14:15 scada-gw su: 'su root' failed for lonvick";
        let ProcessOutcome::Processed(record) =
            harness.pipeline.process_line(line, "syslog").await.unwrap()
        else {
            panic!("expected processed record");
        };

        assert_eq!(record.raw, line);
        assert_eq!(record.host, "scada-gw");
        assert_eq!(record.service, "su");
        // PRI 34 → severity 2 → CRITICAL
        assert_eq!(record.level, gridshield::LogLevel::Critical);
    }

    #[tokio::test]
    async fn test_filtered_records_not_persisted() {
        let mut config = PipelineConfig::default();
        config.filters.min_level = Some("ERROR".to_string());
        let harness = build(config);

        let outcome = harness
            .pipeline
            .process_line(r#"{"message":"routine heartbeat","level":"INFO"}"#, "probe")
            .await
            .unwrap();
        assert!(matches!(outcome, ProcessOutcome::Filtered));
        assert!(harness.ts_store.is_empty());
    }

    #[tokio::test]
    async fn test_threat_alert_delivered_with_composed_message() {
        let harness = default_harness();
        let line = r#"{"message":"port scan sweep detected","src_ip":"198.51.100.4"}"#;
        harness.pipeline.process_line(line, "ids").await.unwrap();

        let posts = harness.webhook.posts();
        assert!(!posts.is_empty());
        let alert = &posts[0]["alert"];
        assert_eq!(alert["title"], "NETWORK_INTRUSION Attack Detected");
        assert!(alert["message"]
            .as_str()
            .unwrap()
            .contains("Source IP: 198.51.100.4"));
    }
}

mod invariants {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Parsing then normalizing never loses the raw line.
        #[test]
        fn prop_raw_preserved(
            message in "[a-zA-Z0-9 ._-]{0,80}",
            level in prop::sample::select(vec!["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"]),
        ) {
            let line = serde_json::json!({"message": message, "level": level}).to_string();
            let registry = gridshield::ingest::ParserRegistry::new(
                &gridshield::config::IngestConfig::default(),
            );
            let normalizer = gridshield::ingest::Normalizer::new(
                &gridshield::config::IngestConfig::default(),
            );
            let parsed = registry.parse(&line, None, None).unwrap();
            let record = normalizer.normalize(parsed, &line, "prop");
            prop_assert_eq!(record.raw, line);
        }
    }

    #[tokio::test]
    async fn test_isolation_is_idempotent_across_replay() {
        let harness = default_harness();
        let line = r#"{"message":"encrypt files .locked payment in bitcoin","src_ip":"203.0.113.77"}"#;

        // At-least-once delivery: the same record arrives twice.
        harness.pipeline.process_line(line, "edr").await.unwrap();
        harness.pipeline.process_line(line, "edr").await.unwrap();

        // Critical severity auto-approves isolation; replay produced no
        // second entry.
        assert!(harness.isolation.is_blocked("203.0.113.77"));
        assert_eq!(harness.isolation.blocked_count(), 1);
        assert_eq!(harness.quarantine.count(), 1);
    }

    #[tokio::test]
    async fn test_detection_ordering_severity_first() {
        let harness = default_harness();
        // Ransom-note text plus intrusion keywords: ransomware (critical)
        // must sort ahead of network intrusion (high).
        let line = r#"{"message":"exploit attempt then encrypt files .locked ransom note","src_ip":"203.0.113.5"}"#;
        let ProcessOutcome::Processed(record) =
            harness.pipeline.process_line(line, "ids").await.unwrap()
        else {
            panic!("expected processed record");
        };

        assert!(record.detections.len() >= 2);
        assert_eq!(record.detections[0].attack_type, AttackType::Ransomware);
        for pair in record.detections.windows(2) {
            assert!(pair[0].severity >= pair[1].severity);
        }
    }

    #[tokio::test]
    async fn test_audit_trail_written_for_automation() {
        let harness = default_harness();
        let line = r#"{"message":"encrypt files .locked readme.txt","src_ip":"203.0.113.8"}"#;
        harness.pipeline.process_line(line, "edr").await.unwrap();

        let audit_logs = harness
            .doc_store
            .find(
                "audit_logs",
                &serde_json::json!({"action": "automation_triggered"}),
                None,
                0,
                10,
            )
            .await
            .unwrap();
        assert!(!audit_logs.is_empty());
        assert_eq!(audit_logs[0]["user"], "pipeline");
    }
}
