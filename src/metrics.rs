//! Prometheus metrics for the GridShield pipeline
//!
//! This module provides metrics collection for:
//! - Log ingestion and per-stage processing
//! - Threat detection events
//! - ML predictions
//! - Automation actions and circuit breakers
//! - Alert delivery
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, TextEncoder,
};

// Global metrics registry
lazy_static! {
    pub static ref METRICS_REGISTRY: prometheus::Registry = {
        let registry = prometheus::Registry::new();

        registry.register(Box::new(LOGS_PROCESSED_TOTAL.clone())).unwrap();
        registry.register(Box::new(LOG_PROCESSING_DURATION_SECONDS.clone())).unwrap();
        registry.register(Box::new(THREATS_DETECTED_TOTAL.clone())).unwrap();
        registry.register(Box::new(THREAT_DETECTION_DURATION_SECONDS.clone())).unwrap();
        registry.register(Box::new(ML_PREDICTIONS_TOTAL.clone())).unwrap();
        registry.register(Box::new(ML_PREDICTION_DURATION_SECONDS.clone())).unwrap();
        registry.register(Box::new(ML_MODEL_ACCURACY.clone())).unwrap();
        registry.register(Box::new(AUTOMATION_ACTIONS_TOTAL.clone())).unwrap();
        registry.register(Box::new(AUTOMATION_ACTION_DURATION_SECONDS.clone())).unwrap();
        registry.register(Box::new(ALERTS_SENT_TOTAL.clone())).unwrap();
        registry.register(Box::new(QUEUE_DEPTH.clone())).unwrap();
        registry.register(Box::new(CIRCUIT_BREAKERS_OPEN.clone())).unwrap();
        registry.register(Box::new(BUS_MESSAGES_CONSUMED_TOTAL.clone())).unwrap();
        registry.register(Box::new(BUS_MESSAGES_PUBLISHED_TOTAL.clone())).unwrap();
        registry.register(Box::new(SYSTEM_MEMORY_USAGE_BYTES.clone())).unwrap();
        registry.register(Box::new(SYSTEM_CPU_USAGE_PERCENT.clone())).unwrap();

        registry
    };

    // Log processing metrics
    pub static ref LOGS_PROCESSED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gridshield_logs_processed_total", "Total number of logs processed"),
        &["source", "status"]
    ).unwrap();

    pub static ref LOG_PROCESSING_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("gridshield_log_processing_duration_seconds", "Time spent processing logs")
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["source"]
    ).unwrap();

    // Threat detection metrics
    pub static ref THREATS_DETECTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gridshield_threats_detected_total", "Total number of threats detected"),
        &["attack_type", "severity"]
    ).unwrap();

    pub static ref THREAT_DETECTION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("gridshield_threat_detection_duration_seconds", "Time spent in detector fan-out")
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0])
    ).unwrap();

    // ML prediction metrics
    pub static ref ML_PREDICTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gridshield_ml_predictions_total", "Total number of ML predictions"),
        &["model_type", "result"]
    ).unwrap();

    pub static ref ML_PREDICTION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("gridshield_ml_prediction_duration_seconds", "Time spent on ML predictions")
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1])
    ).unwrap();

    pub static ref ML_MODEL_ACCURACY: GaugeVec = GaugeVec::new(
        Opts::new("gridshield_ml_model_accuracy", "ML model accuracy"),
        &["model_name"]
    ).unwrap();

    // Automation metrics
    pub static ref AUTOMATION_ACTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gridshield_automation_actions_total", "Total number of automation actions"),
        &["action_type", "status"]
    ).unwrap();

    pub static ref AUTOMATION_ACTION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("gridshield_automation_action_duration_seconds", "Time spent executing automation actions")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
        &["action_type"]
    ).unwrap();

    // Alerting metrics
    pub static ref ALERTS_SENT_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gridshield_alerts_sent_total", "Total number of alerts sent"),
        &["channel", "severity"]
    ).unwrap();

    // Stream metrics
    pub static ref QUEUE_DEPTH: IntGaugeVec = IntGaugeVec::new(
        Opts::new("gridshield_queue_depth", "Depth of processing queue"),
        &["queue_name"]
    ).unwrap();

    pub static ref CIRCUIT_BREAKERS_OPEN: IntGauge = IntGauge::new(
        "gridshield_circuit_breakers_open",
        "Number of circuit breakers currently open"
    ).unwrap();

    pub static ref BUS_MESSAGES_CONSUMED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gridshield_bus_messages_consumed_total", "Total number of bus messages consumed"),
        &["topic"]
    ).unwrap();

    pub static ref BUS_MESSAGES_PUBLISHED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gridshield_bus_messages_published_total", "Total number of bus messages published"),
        &["topic"]
    ).unwrap();

    // System metrics
    pub static ref SYSTEM_MEMORY_USAGE_BYTES: Gauge = Gauge::new(
        "gridshield_system_memory_usage_bytes",
        "Current memory usage in bytes"
    ).unwrap();

    pub static ref SYSTEM_CPU_USAGE_PERCENT: Gauge = Gauge::new(
        "gridshield_system_cpu_usage_percent",
        "Current CPU usage percentage"
    ).unwrap();
}

/// Record a processed log entry
pub fn record_log_processed(source: &str, status: &str, duration_secs: f64) {
    LOGS_PROCESSED_TOTAL.with_label_values(&[source, status]).inc();
    LOG_PROCESSING_DURATION_SECONDS
        .with_label_values(&[source])
        .observe(duration_secs);
}

/// Record a threat detection
pub fn record_threat_detected(attack_type: &str, severity: &str, duration_secs: f64) {
    THREATS_DETECTED_TOTAL
        .with_label_values(&[attack_type, severity])
        .inc();
    THREAT_DETECTION_DURATION_SECONDS.observe(duration_secs);
}

/// Record an ML prediction
pub fn record_ml_prediction(model_type: &str, result: &str, duration_secs: f64) {
    ML_PREDICTIONS_TOTAL
        .with_label_values(&[model_type, result])
        .inc();
    ML_PREDICTION_DURATION_SECONDS.observe(duration_secs);
}

/// Record an automation action outcome
pub fn record_automation_action(action_type: &str, status: &str, duration_secs: f64) {
    AUTOMATION_ACTIONS_TOTAL
        .with_label_values(&[action_type, status])
        .inc();
    AUTOMATION_ACTION_DURATION_SECONDS
        .with_label_values(&[action_type])
        .observe(duration_secs);
}

/// Record an alert delivery
pub fn record_alert_sent(channel: &str, severity: &str) {
    ALERTS_SENT_TOTAL.with_label_values(&[channel, severity]).inc();
}

/// Generate metrics output in Prometheus text exposition format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&METRICS_REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Initialize metrics with default values
pub fn init_metrics() {
    CIRCUIT_BREAKERS_OPEN.set(0);
    QUEUE_DEPTH.with_label_values(&["ingest"]).set(0);
}

/// Update system metrics
pub fn update_system_metrics() {
    use sysinfo::System;

    let mut sys = System::new_all();
    sys.refresh_all();

    let used_memory = sys.used_memory() as f64 * 1024.0;
    SYSTEM_MEMORY_USAGE_BYTES.set(used_memory);

    let cpu_usage = sys.global_cpu_info().cpu_usage() as f64;
    SYSTEM_CPU_USAGE_PERCENT.set(cpu_usage);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics() {
        record_log_processed("syslog", "processed", 0.002);
        record_threat_detected("ddos", "high", 0.001);
        let output = encode_metrics().unwrap();
        assert!(output.contains("gridshield_logs_processed_total"));
        assert!(output.contains("gridshield_threats_detected_total"));
    }
}
