//! Automation Module
//! =================
//! Maps detections onto a deterministic action policy, routes actions
//! through the approval workflow, and dispatches them to actuators under
//! circuit-breaker protection. Actions requiring approval are queued, not
//! awaited; the operator path completes them later.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

pub mod approval;
pub mod circuit_breaker;
pub mod failover;
pub mod isolation;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::{CircuitBreakerSettings, StreamConfig};
use crate::detect::{AttackType, Detection, Severity};
use crate::error::{PipelineError, PipelineResult};
use crate::metrics::record_automation_action;

pub use approval::{ApprovalRequest, ApprovalStatus, ApprovalWorkflow, RequestOutcome};
pub use circuit_breaker::{BreakerState, BreakerStatus, CircuitBreaker};
pub use failover::{BackupActivator, BackupKind, InMemoryBackupActivator};
pub use isolation::{
    BlockKey, DeviceQuarantine, InMemoryIsolation, NetworkIsolation, QuarantineEntry,
    TrafficBlock, TrafficBlocking,
};

/// Defense operations the orchestrator can dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    NetworkIsolation,
    DeviceQuarantine,
    TrafficBlocking,
    Failover,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::NetworkIsolation => "network_isolation",
            ActionType::DeviceQuarantine => "device_quarantine",
            ActionType::TrafficBlocking => "traffic_blocking",
            ActionType::Failover => "failover",
        }
    }

    /// Which breaker family guards this action.
    fn breaker(&self) -> &'static str {
        match self {
            ActionType::Failover => "failover",
            _ => "isolation",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A policy-resolved action awaiting dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedAction {
    pub action: ActionType,
    pub auto_approve: bool,
}

/// Terminal state of one action within a report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ActionOutcome {
    Executed { details: Value },
    AwaitingApproval { approval_id: String },
    CircuitOpen { breaker: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action: ActionType,
    pub auto_approved: bool,
    #[serde(flatten)]
    pub outcome: ActionOutcome,
}

/// Result of running the automation policy for one detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReport {
    pub success: bool,
    pub actions: Vec<ActionRecord>,
    #[serde(default)]
    pub approvals: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Status snapshot for the admin surface
#[derive(Debug, Clone, Serialize)]
pub struct AutomationStatus {
    pub circuit_breakers: std::collections::HashMap<String, BreakerStatus>,
    pub quarantined_devices: usize,
    pub blocked_traffic: usize,
    pub pending_approvals: usize,
}

/// Static action policy. Deterministic in `(attack_type, severity)`.
pub fn determine_actions(attack_type: AttackType, severity: Severity) -> Vec<PlannedAction> {
    let mut actions = Vec::new();
    let auto = severity == Severity::Critical;

    if severity >= Severity::High {
        actions.push(PlannedAction {
            action: ActionType::NetworkIsolation,
            auto_approve: auto,
        });
        actions.push(PlannedAction {
            action: ActionType::DeviceQuarantine,
            auto_approve: auto,
        });
    }

    match attack_type {
        AttackType::Ddos => actions.push(PlannedAction {
            action: ActionType::TrafficBlocking,
            auto_approve: true,
        }),
        AttackType::Ransomware | AttackType::ScadaAttack => actions.push(PlannedAction {
            action: ActionType::Failover,
            auto_approve: true,
        }),
        AttackType::InsiderThreat => actions.push(PlannedAction {
            action: ActionType::DeviceQuarantine,
            // Human judgment is mandatory for insiders.
            auto_approve: false,
        }),
        _ => {}
    }

    actions
}

/// Orchestrator driving the per-detection state machine:
/// received → policy resolved → auto-approved or awaiting approval →
/// executing → succeeded/failed → reported.
pub struct AutomationOrchestrator {
    isolation: Arc<dyn NetworkIsolation>,
    quarantine: Arc<DeviceQuarantine>,
    blocking: Arc<TrafficBlocking>,
    failover: Arc<dyn BackupActivator>,
    approvals: Arc<ApprovalWorkflow>,
    isolation_breaker: CircuitBreaker,
    failover_breaker: CircuitBreaker,
    actuator_timeout: Duration,
}

impl AutomationOrchestrator {
    pub fn new(
        isolation: Arc<dyn NetworkIsolation>,
        quarantine: Arc<DeviceQuarantine>,
        blocking: Arc<TrafficBlocking>,
        failover: Arc<dyn BackupActivator>,
        approvals: Arc<ApprovalWorkflow>,
        breaker_settings: &CircuitBreakerSettings,
        stream: &StreamConfig,
    ) -> Self {
        let cooldown = Duration::from_secs(breaker_settings.cooldown_secs);
        Self {
            isolation,
            quarantine,
            blocking,
            failover,
            approvals,
            isolation_breaker: CircuitBreaker::new(
                "isolation",
                breaker_settings.isolation_failure_threshold,
                cooldown,
            ),
            failover_breaker: CircuitBreaker::new(
                "failover",
                breaker_settings.failover_failure_threshold,
                cooldown,
            ),
            actuator_timeout: Duration::from_secs(stream.actuator_timeout_secs),
        }
    }

    pub fn approvals(&self) -> &Arc<ApprovalWorkflow> {
        &self.approvals
    }

    pub fn quarantine(&self) -> &Arc<DeviceQuarantine> {
        &self.quarantine
    }

    pub fn blocking(&self) -> &Arc<TrafficBlocking> {
        &self.blocking
    }

    /// Run the automation policy for one detection.
    pub async fn handle_threat(&self, detection: &Detection) -> ActionReport {
        warn!(
            attack_type = %detection.attack_type,
            severity = %detection.severity,
            source_ip = detection.source_ip().unwrap_or("unknown"),
            "handling threat"
        );

        let planned = determine_actions(detection.attack_type, detection.severity);
        let mut report = ActionReport {
            success: false,
            actions: Vec::new(),
            approvals: Vec::new(),
            errors: Vec::new(),
        };

        for action in planned {
            let record = self.execute_action(action, detection).await;
            match &record.outcome {
                ActionOutcome::AwaitingApproval { approval_id } => {
                    report.approvals.push(approval_id.clone());
                }
                ActionOutcome::Failed { error } => report.errors.push(error.clone()),
                _ => {}
            }
            report.actions.push(record);
        }

        report.success = report
            .actions
            .iter()
            .any(|a| matches!(a.outcome, ActionOutcome::Executed { .. }));

        info!(
            actions = report.actions.len(),
            success = report.success,
            "threat handling completed"
        );
        report
    }

    async fn execute_action(&self, planned: PlannedAction, detection: &Detection) -> ActionRecord {
        // Actions without auto-approval are queued for an operator and
        // completed later through the approval path.
        if !planned.auto_approve && self.approvals.require_approval {
            let outcome = self.approvals.request(
                planned.action,
                serde_json::to_value(detection).unwrap_or(Value::Null),
                format!("{} attack detected", detection.attack_type),
                detection.severity,
                false,
            );
            if let RequestOutcome::Pending { id, .. } = outcome {
                record_automation_action(planned.action.as_str(), "awaiting_approval", 0.0);
                return ActionRecord {
                    action: planned.action,
                    auto_approved: false,
                    outcome: ActionOutcome::AwaitingApproval { approval_id: id },
                };
            }
        }

        let outcome = self.dispatch(planned.action, detection).await;
        ActionRecord {
            action: planned.action,
            auto_approved: planned.auto_approve,
            outcome,
        }
    }

    /// Dispatch one action through its circuit breaker with a per-call
    /// timeout.
    pub async fn dispatch(&self, action: ActionType, detection: &Detection) -> ActionOutcome {
        let breaker = match action.breaker() {
            "failover" => &self.failover_breaker,
            _ => &self.isolation_breaker,
        };

        if !breaker.allow() {
            record_automation_action(action.as_str(), "circuit_open", 0.0);
            return ActionOutcome::CircuitOpen {
                breaker: breaker.name().to_string(),
            };
        }

        let started = Instant::now();
        let result =
            tokio::time::timeout(self.actuator_timeout, self.perform(action, detection)).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(Ok(details)) => {
                breaker.record_success();
                record_automation_action(action.as_str(), "success", elapsed);
                ActionOutcome::Executed { details }
            }
            Ok(Err(err)) => {
                breaker.record_failure();
                record_automation_action(action.as_str(), "failed", elapsed);
                error!(action = %action, %err, "action failed");
                ActionOutcome::Failed {
                    error: err.to_string(),
                }
            }
            Err(_) => {
                breaker.record_failure();
                record_automation_action(action.as_str(), "timeout", elapsed);
                error!(action = %action, "actuator call timed out");
                ActionOutcome::Failed {
                    error: format!("actuator timeout after {:?}", self.actuator_timeout),
                }
            }
        }
    }

    async fn perform(&self, action: ActionType, detection: &Detection) -> PipelineResult<Value> {
        let reason = format!("{} attack", detection.attack_type);
        match action {
            ActionType::NetworkIsolation => self.isolation.isolate(detection).await,
            ActionType::DeviceQuarantine => {
                let device_id = detection
                    .source_ip()
                    .or_else(|| detection.user())
                    .ok_or_else(|| {
                        PipelineError::Actuator("no device identity in detection".to_string())
                    })?;
                let metadata = serde_json::to_value(detection).unwrap_or(Value::Null);
                self.quarantine.quarantine(device_id, reason.as_str(), metadata);
                Ok(json!({ "device_id": device_id, "quarantined": true }))
            }
            ActionType::TrafficBlocking => {
                let key = BlockKey {
                    src_ip: detection.source_ip().map(str::to_string),
                    dst_ip: None,
                    port: detection.port(),
                    protocol: Some(detection.protocol().unwrap_or("tcp").to_string()),
                };
                self.blocking.block(key.clone(), reason.as_str());
                Ok(json!({ "blocked": key }))
            }
            ActionType::Failover => {
                let system = match detection.context.get("system") {
                    Some(Value::String(system)) => system.clone(),
                    _ => "default".to_string(),
                };
                self.failover.activate(&system, &reason).await
            }
        }
    }

    /// Execute an action whose approval request has been approved.
    pub async fn execute_approved(&self, approval_id: &str) -> PipelineResult<ActionRecord> {
        let approval = self
            .approvals
            .get(approval_id)
            .ok_or_else(|| PipelineError::ApprovalNotFound(approval_id.to_string()))?;

        if approval.status != ApprovalStatus::Approved {
            return Err(PipelineError::ApprovalWrongState {
                id: approval_id.to_string(),
                status: approval.status.as_str().to_string(),
                expected: "approved".to_string(),
            });
        }

        let detection: Detection = serde_json::from_value(approval.action_params.clone())
            .map_err(|e| PipelineError::Internal(format!("corrupt approval params: {e}")))?;

        let outcome = self.dispatch(approval.action, &detection).await;
        Ok(ActionRecord {
            action: approval.action,
            auto_approved: false,
            outcome,
        })
    }

    pub fn status(&self) -> AutomationStatus {
        let mut circuit_breakers = std::collections::HashMap::new();
        for breaker in [&self.isolation_breaker, &self.failover_breaker] {
            circuit_breakers.insert(breaker.name().to_string(), breaker.status());
        }
        AutomationStatus {
            circuit_breakers,
            quarantined_devices: self.quarantine.count(),
            blocked_traffic: self.blocking.count(),
            pending_approvals: self.approvals.pending_count(),
        }
    }

    pub fn breaker_state(&self, name: &str) -> Option<BreakerState> {
        match name {
            "isolation" => Some(self.isolation_breaker.state()),
            "failover" => Some(self.failover_breaker.state()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApprovalConfig;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn detection(attack_type: AttackType, severity: Severity, ip: Option<&str>) -> Detection {
        let mut context = HashMap::new();
        if let Some(ip) = ip {
            context.insert("source_ip".to_string(), json!(ip));
        }
        Detection {
            attack_type,
            detector: attack_type.as_str().to_string(),
            severity,
            confidence: 0.9,
            indicators: vec![],
            context,
        }
    }

    struct FailingIsolation {
        calls: AtomicU32,
    }

    #[async_trait]
    impl NetworkIsolation for FailingIsolation {
        async fn isolate(&self, _detection: &Detection) -> PipelineResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PipelineError::Actuator("firewall unreachable".to_string()))
        }

        async fn release(&self, _ip: &str) -> PipelineResult<()> {
            Ok(())
        }
    }

    fn orchestrator_with(isolation: Arc<dyn NetworkIsolation>) -> AutomationOrchestrator {
        AutomationOrchestrator::new(
            isolation,
            Arc::new(DeviceQuarantine::new()),
            Arc::new(TrafficBlocking::new()),
            Arc::new(InMemoryBackupActivator::new(
                [("default".to_string(), BackupKind::Direct)].into(),
            )),
            Arc::new(ApprovalWorkflow::new(&ApprovalConfig::default())),
            &CircuitBreakerSettings::default(),
            &StreamConfig::default(),
        )
    }

    #[test]
    fn test_policy_is_deterministic() {
        for _ in 0..3 {
            let a = determine_actions(AttackType::Ddos, Severity::High);
            let b = determine_actions(AttackType::Ddos, Severity::High);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_policy_table() {
        let ddos = determine_actions(AttackType::Ddos, Severity::High);
        assert_eq!(
            ddos.iter().map(|p| p.action).collect::<Vec<_>>(),
            vec![
                ActionType::NetworkIsolation,
                ActionType::DeviceQuarantine,
                ActionType::TrafficBlocking
            ]
        );
        // Traffic blocking is always auto-approved.
        assert!(ddos[2].auto_approve);
        // High severity does not auto-approve isolation.
        assert!(!ddos[0].auto_approve);

        let ransomware = determine_actions(AttackType::Ransomware, Severity::Critical);
        assert!(ransomware.iter().all(|p| p.auto_approve));
        assert!(ransomware.iter().any(|p| p.action == ActionType::Failover));

        let insider = determine_actions(AttackType::InsiderThreat, Severity::High);
        let quarantines: Vec<_> = insider
            .iter()
            .filter(|p| p.action == ActionType::DeviceQuarantine)
            .collect();
        assert!(quarantines.iter().all(|p| !p.auto_approve));

        // Low severity, unlisted type: no actions at all.
        assert!(determine_actions(AttackType::NetworkIntrusion, Severity::Low).is_empty());
    }

    #[tokio::test]
    async fn test_ddos_traffic_blocking_auto_approved() {
        let orchestrator = orchestrator_with(Arc::new(InMemoryIsolation::new()));
        let report = orchestrator
            .handle_threat(&detection(AttackType::Ddos, Severity::High, Some("10.0.0.1")))
            .await;

        assert!(report.success);
        let blocking = report
            .actions
            .iter()
            .find(|a| a.action == ActionType::TrafficBlocking)
            .unwrap();
        assert!(matches!(blocking.outcome, ActionOutcome::Executed { .. }));
        assert_eq!(orchestrator.blocking().count(), 1);
        // Isolation and quarantine wait for an operator at high severity.
        assert_eq!(report.approvals.len(), 2);
    }

    #[tokio::test]
    async fn test_breaker_opens_after_consecutive_failures() {
        let isolation = Arc::new(FailingIsolation {
            calls: AtomicU32::new(0),
        });
        let orchestrator = orchestrator_with(isolation.clone());
        let det = detection(AttackType::Ransomware, Severity::Critical, Some("10.0.0.9"));

        for _ in 0..5 {
            let outcome = orchestrator.dispatch(ActionType::NetworkIsolation, &det).await;
            assert!(matches!(outcome, ActionOutcome::Failed { .. }));
        }
        assert_eq!(
            orchestrator.breaker_state("isolation"),
            Some(BreakerState::Open)
        );

        // Sixth dispatch is short-circuited without touching the actuator.
        let outcome = orchestrator.dispatch(ActionType::NetworkIsolation, &det).await;
        assert!(matches!(outcome, ActionOutcome::CircuitOpen { .. }));
        assert_eq!(isolation.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_approved_action_executes() {
        let orchestrator = orchestrator_with(Arc::new(InMemoryIsolation::new()));
        let report = orchestrator
            .handle_threat(&detection(
                AttackType::InsiderThreat,
                Severity::High,
                Some("10.0.0.7"),
            ))
            .await;
        let approval_id = report.approvals.first().unwrap().clone();

        // Executing before approval is a state error.
        assert!(orchestrator.execute_approved(&approval_id).await.is_err());

        orchestrator
            .approvals()
            .approve(&approval_id, "operator", None)
            .unwrap();
        let record = orchestrator.execute_approved(&approval_id).await.unwrap();
        assert!(matches!(record.outcome, ActionOutcome::Executed { .. }));
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let orchestrator = orchestrator_with(Arc::new(InMemoryIsolation::new()));
        orchestrator
            .handle_threat(&detection(AttackType::Ddos, Severity::High, Some("10.0.0.3")))
            .await;
        let status = orchestrator.status();
        assert_eq!(status.blocked_traffic, 1);
        assert_eq!(status.pending_approvals, 2);
        assert!(status.circuit_breakers.contains_key("isolation"));
        assert!(status.circuit_breakers.contains_key("failover"));
    }
}
