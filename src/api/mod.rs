//! API Gateway Module
//! ==================
//! REST surface for alerts, automation approvals, threat queries and
//! health, in front of the pipeline core. Approval and audit routes
//! require bearer-token auth; every request leaves an audit record.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::alerting::{AlertFilter, AlertStatus, SendResult};
use crate::audit::{AuditAction, AuditFilter, AuditLogger};
use crate::detect::{Detection, Severity};
use crate::enrich::threat_intel::ThreatIntelEnricher;
use crate::error::PipelineError;
use crate::pipeline::LogPipeline;
use crate::storage::{DocStore, HealthProbe};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<LogPipeline>,
    pub doc_store: Arc<dyn DocStore>,
    pub audit: Arc<AuditLogger>,
    pub intel: Arc<ThreatIntelEnricher>,
    pub probes: Arc<Vec<Arc<dyn HealthProbe>>>,
    pub auth_token: Option<String>,
}

/// Error wrapper mapping the pipeline taxonomy onto HTTP statuses
struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PipelineError::ApprovalNotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::ApprovalExpired(_) | PipelineError::ApprovalWrongState { .. } => {
                StatusCode::CONFLICT
            }
            PipelineError::Config(_) | PipelineError::Parse(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "success": false,
            "error": self.0.code(),
            "detail": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// REST API gateway for pipeline management
pub struct ApiGateway {
    state: AppState,
}

impl ApiGateway {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn router(&self) -> Router {
        let protected = Router::new()
            .route("/automation/approvals", get(get_approvals))
            .route("/automation/approvals/:id/approve", post(approve_action))
            .route("/automation/approvals/:id/reject", post(reject_action))
            .route("/audit", get(get_audit_logs))
            .route("/intel/malicious", post(add_malicious_ip))
            .route("/intel/suspicious", post(add_suspicious_ip))
            .route("/intel/:ip", axum::routing::delete(remove_intel_ip))
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                require_bearer_auth,
            ));

        Router::new()
            .route("/alerts", post(create_alert).get(list_alerts))
            .route("/alerts/:id/resolve", post(resolve_alert))
            .route("/automation/execute", post(execute_automation))
            .route("/automation/status", get(automation_status))
            .route("/threats", get(list_threats))
            .route("/threats/stats/summary", get(threat_summary))
            .route("/threats/:id", get(get_threat))
            .route("/logs/stats/summary", get(log_summary))
            .merge(protected)
            .route("/health", get(health))
            .route("/ready", get(ready))
            .route("/live", get(live))
            .route("/metrics", get(prometheus_metrics))
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                audit_requests,
            ))
            .with_state(self.state.clone())
    }

    pub async fn serve(&self, addr: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// Bearer-token check for approval, intel and audit routes.
async fn require_bearer_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.auth_token.as_deref() else {
        // No token configured: the deployment opted out of auth.
        return next.run(request).await;
    };
    let provided = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if provided == Some(expected) {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "error": "authentication required"})),
        )
            .into_response()
    }
}

/// Audit trail for every API request, mapped from the HTTP method.
async fn audit_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;

    // Probe and scrape endpoints would flood the trail.
    if !matches!(path.as_str(), "/health" | "/ready" | "/live" | "/metrics") {
        let action = AuditAction::from_http_method(&method);
        let success = response.status().as_u16() < 400;
        state
            .audit
            .log(
                action,
                "api",
                &path,
                json!({"method": method, "status": response.status().as_u16()}),
                success,
                None,
            )
            .await;
    }

    response
}

#[derive(Deserialize)]
struct CreateAlertRequest {
    title: String,
    message: String,
    #[serde(default)]
    severity: Option<Severity>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, Value>,
}

async fn create_alert(
    State(state): State<AppState>,
    Json(request): Json<CreateAlertRequest>,
) -> Result<Response, ApiError> {
    let result = state
        .pipeline
        .notifier()
        .send_alert(
            request.title,
            request.message,
            request.severity.unwrap_or(Severity::Medium),
            request.source.unwrap_or_else(|| "api".to_string()),
            request.metadata,
            None,
        )
        .await;

    Ok(match result {
        SendResult::Duplicate => (
            StatusCode::OK,
            Json(json!({"success": false, "reason": "duplicate"})),
        )
            .into_response(),
        SendResult::Sent {
            alert_id,
            channels,
            success,
        } => (
            StatusCode::CREATED,
            Json(json!({"success": success, "alert_id": alert_id, "channels": channels})),
        )
            .into_response(),
    })
}

#[derive(Deserialize)]
struct AlertListQuery {
    severity: Option<Severity>,
    source: Option<String>,
    status: Option<AlertStatus>,
}

async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertListQuery>,
) -> Json<Value> {
    let alerts = state.pipeline.notifier().alert_manager().list(&AlertFilter {
        severity: query.severity,
        source: query.source,
        status: query.status,
    });
    Json(json!({"alerts": alerts, "count": alerts.len()}))
}

async fn resolve_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<String>,
) -> Response {
    if state
        .pipeline
        .notifier()
        .alert_manager()
        .mark_resolved(&alert_id)
    {
        Json(json!({"success": true, "alert_id": alert_id})).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"success": false, "error": "alert not found"})),
        )
            .into_response()
    }
}

#[derive(Deserialize)]
struct ExecuteRequest {
    detection: Detection,
}

async fn execute_automation(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Json<Value> {
    let report = state
        .pipeline
        .automation()
        .handle_threat(&request.detection)
        .await;
    Json(json!({
        "success": report.success,
        "actions": report.actions,
        "approvals": report.approvals,
        "errors": report.errors,
    }))
}

async fn get_approvals(State(state): State<AppState>) -> Json<Value> {
    let approvals = state.pipeline.automation().approvals().pending();
    Json(json!({"approvals": approvals, "count": approvals.len()}))
}

#[derive(Deserialize)]
struct DecisionRequest {
    approver: String,
    #[serde(default)]
    comment: Option<String>,
}

async fn approve_action(
    State(state): State<AppState>,
    Path(approval_id): Path<String>,
    Json(request): Json<DecisionRequest>,
) -> Result<Json<Value>, ApiError> {
    let automation = state.pipeline.automation();
    automation
        .approvals()
        .approve(&approval_id, request.approver.as_str(), request.comment)?;

    state
        .audit
        .log(
            AuditAction::Approve,
            &request.approver,
            &format!("/automation/approvals/{approval_id}"),
            json!({}),
            true,
            None,
        )
        .await;

    // The approved action executes immediately on the operator path.
    let execution = automation.execute_approved(&approval_id).await?;
    Ok(Json(json!({
        "success": true,
        "approval_id": approval_id,
        "status": "approved",
        "execution": execution,
    })))
}

async fn reject_action(
    State(state): State<AppState>,
    Path(approval_id): Path<String>,
    Json(request): Json<DecisionRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .pipeline
        .automation()
        .approvals()
        .reject(&approval_id, request.approver.as_str(), request.comment)?;

    state
        .audit
        .log(
            AuditAction::Reject,
            &request.approver,
            &format!("/automation/approvals/{approval_id}"),
            json!({}),
            true,
            None,
        )
        .await;

    Ok(Json(json!({
        "success": true,
        "approval_id": approval_id,
        "status": "rejected",
    })))
}

async fn automation_status(State(state): State<AppState>) -> Json<Value> {
    let status = state.pipeline.automation().status();
    Json(json!({
        "circuit_breakers": status.circuit_breakers,
        "quarantined_devices": status.quarantined_devices,
        "blocked_traffic": status.blocked_traffic,
        "pending_approvals": status.pending_approvals,
    }))
}

#[derive(Deserialize)]
struct ThreatQuery {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    skip: Option<usize>,
    attack_type: Option<String>,
    severity: Option<String>,
}

async fn list_threats(
    State(state): State<AppState>,
    Query(query): Query<ThreatQuery>,
) -> Result<Json<Value>, ApiError> {
    let mut filter = serde_json::Map::new();
    if let Some(attack_type) = &query.attack_type {
        filter.insert("detections.attack_type".to_string(), json!(attack_type));
    }
    if let Some(severity) = &query.severity {
        filter.insert("detections.severity".to_string(), json!(severity));
    }

    let limit = query.limit.unwrap_or(100).min(1000);
    let docs = state
        .doc_store
        .find(
            "logs",
            &Value::Object(filter),
            Some("timestamp"),
            query.skip.unwrap_or(0),
            limit.max(1) * 10,
        )
        .await?;

    let threats: Vec<Value> = docs
        .into_iter()
        .filter(|doc| {
            doc.get("detections")
                .and_then(|d| d.as_array())
                .map(|d| !d.is_empty())
                .unwrap_or(false)
        })
        .take(limit)
        .collect();

    Ok(Json(json!({"threats": threats, "count": threats.len()})))
}

async fn get_threat(
    State(state): State<AppState>,
    Path(record_id): Path<String>,
) -> Result<Response, ApiError> {
    let docs = state
        .doc_store
        .find("logs", &json!({"record_id": record_id}), None, 0, 1)
        .await?;
    Ok(match docs.into_iter().next() {
        Some(doc) => Json(doc).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"success": false, "error": "threat not found"})),
        )
            .into_response(),
    })
}

async fn threat_summary(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let docs = state
        .doc_store
        .find("logs", &json!({}), None, 0, 10_000)
        .await?;

    let mut by_attack_type: HashMap<String, u64> = HashMap::new();
    let mut by_severity: HashMap<String, u64> = HashMap::new();
    let mut total = 0u64;

    for doc in &docs {
        let Some(detections) = doc.get("detections").and_then(|d| d.as_array()) else {
            continue;
        };
        for detection in detections {
            total += 1;
            if let Some(attack_type) = detection.get("attack_type").and_then(|v| v.as_str()) {
                *by_attack_type.entry(attack_type.to_string()).or_insert(0) += 1;
            }
            if let Some(severity) = detection.get("severity").and_then(|v| v.as_str()) {
                *by_severity.entry(severity.to_string()).or_insert(0) += 1;
            }
        }
    }

    Ok(Json(json!({
        "total": total,
        "by_attack_type": by_attack_type,
        "by_severity": by_severity,
    })))
}

async fn log_summary(State(state): State<AppState>) -> Json<Value> {
    let counts = state.pipeline.aggregator().counts();
    Json(json!({
        "total": counts.total,
        "by_level": counts.by_level,
        "by_source": counts.by_source,
    }))
}

#[derive(Deserialize)]
struct AuditQuery {
    user: Option<String>,
    action: Option<String>,
    resource: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn get_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Value>, ApiError> {
    let logs = state
        .audit
        .query(
            &AuditFilter {
                user: query.user,
                action: query.action,
                resource: query.resource,
            },
            query.limit.unwrap_or(100).min(1000),
        )
        .await?;
    Ok(Json(json!({"audit_logs": logs, "count": logs.len()})))
}

#[derive(Deserialize)]
struct IntelRequest {
    ip: String,
}

async fn add_malicious_ip(
    State(state): State<AppState>,
    Json(request): Json<IntelRequest>,
) -> Json<Value> {
    state.intel.add_malicious(request.ip.as_str());
    Json(json!({"success": true, "ip": request.ip}))
}

async fn add_suspicious_ip(
    State(state): State<AppState>,
    Json(request): Json<IntelRequest>,
) -> Json<Value> {
    state.intel.add_suspicious(request.ip.as_str());
    Json(json!({"success": true, "ip": request.ip}))
}

async fn remove_intel_ip(State(state): State<AppState>, Path(ip): Path<String>) -> Json<Value> {
    state.intel.remove(&ip);
    Json(json!({"success": true, "ip": ip}))
}

async fn health(State(state): State<AppState>) -> Response {
    let mut components = serde_json::Map::new();
    let mut overall_healthy = true;
    for probe in state.probes.iter() {
        let healthy = probe.healthy().await;
        overall_healthy &= healthy;
        components.insert(
            probe.name().to_string(),
            json!({"status": if healthy { "healthy" } else { "unhealthy" }}),
        );
    }

    let status = if overall_healthy {
        StatusCode::OK
    } else {
        warn!("health check degraded");
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if overall_healthy { "healthy" } else { "unhealthy" },
            "version": env!("CARGO_PKG_VERSION"),
            "components": components,
        })),
    )
        .into_response()
}

async fn ready(State(state): State<AppState>) -> Response {
    // Ready when every store answers its probe.
    health(State(state)).await
}

async fn live() -> Json<Value> {
    Json(json!({"status": "alive"}))
}

async fn prometheus_metrics() -> String {
    crate::metrics::encode_metrics().unwrap_or_else(|_| "# Error encoding metrics".to_string())
}
