//! Approval Workflow
//! =================
//! In-memory store of operator approval requests gating semi-automatic
//! actions. A periodic sweeper expires stale requests; deciding an
//! expired request is an error, never a side effect.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::automation::ActionType;
use crate::config::ApprovalConfig;
use crate::detect::Severity;
use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
    AutoApproved,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::Expired => "expired",
            ApprovalStatus::AutoApproved => "auto_approved",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub action: ActionType,
    pub action_params: Value,
    pub reason: String,
    pub severity: Severity,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Outcome of an approval request
#[derive(Debug, Clone)]
pub enum RequestOutcome {
    /// Waiting for an operator decision
    Pending { id: String, expires_at: DateTime<Utc> },
    /// Approved synchronously (critical severity with auto-approve)
    AutoApproved { id: String },
}

pub struct ApprovalWorkflow {
    timeout: Duration,
    pub require_approval: bool,
    requests: RwLock<HashMap<String, ApprovalRequest>>,
}

impl ApprovalWorkflow {
    pub fn new(config: &ApprovalConfig) -> Self {
        Self {
            timeout: Duration::seconds(config.auto_approve_timeout_secs as i64),
            require_approval: config.require_approval,
            requests: RwLock::new(HashMap::new()),
        }
    }

    /// Create an approval request. A critical request with auto-approve is
    /// approved synchronously with approver `auto_approved`.
    pub fn request(
        &self,
        action: ActionType,
        action_params: Value,
        reason: impl Into<String>,
        severity: Severity,
        auto_approve: bool,
    ) -> RequestOutcome {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now + self.timeout;
        let request = ApprovalRequest {
            id: id.clone(),
            action,
            action_params,
            reason: reason.into(),
            severity,
            status: ApprovalStatus::Pending,
            created_at: now,
            expires_at,
            decided_by: None,
            decided_at: None,
            comment: None,
        };
        self.requests.write().insert(id.clone(), request);

        info!(
            approval_id = %id,
            action = %action,
            severity = %severity,
            auto_approve,
            "approval requested"
        );

        if severity == Severity::Critical && auto_approve {
            let mut requests = self.requests.write();
            if let Some(request) = requests.get_mut(&id) {
                request.status = ApprovalStatus::AutoApproved;
                request.decided_by = Some("auto_approved".to_string());
                request.decided_at = Some(Utc::now());
                request.comment = Some("critical threat, auto approved".to_string());
            }
            return RequestOutcome::AutoApproved { id };
        }

        RequestOutcome::Pending { id, expires_at }
    }

    /// Approve a pending request.
    pub fn approve(
        &self,
        id: &str,
        approver: impl Into<String>,
        comment: Option<String>,
    ) -> PipelineResult<()> {
        self.decide(id, ApprovalStatus::Approved, approver.into(), comment)
    }

    /// Reject a pending request.
    pub fn reject(
        &self,
        id: &str,
        rejector: impl Into<String>,
        reason: Option<String>,
    ) -> PipelineResult<()> {
        self.decide(id, ApprovalStatus::Rejected, rejector.into(), reason)
    }

    fn decide(
        &self,
        id: &str,
        status: ApprovalStatus,
        decider: String,
        comment: Option<String>,
    ) -> PipelineResult<()> {
        let mut requests = self.requests.write();
        let request = requests
            .get_mut(id)
            .ok_or_else(|| PipelineError::ApprovalNotFound(id.to_string()))?;

        // An expired request must be marked expired before any decision.
        if request.status == ApprovalStatus::Pending && Utc::now() > request.expires_at {
            request.status = ApprovalStatus::Expired;
            return Err(PipelineError::ApprovalExpired(id.to_string()));
        }

        if request.status != ApprovalStatus::Pending {
            return Err(PipelineError::ApprovalWrongState {
                id: id.to_string(),
                status: request.status.as_str().to_string(),
                expected: "pending".to_string(),
            });
        }

        request.status = status;
        request.decided_by = Some(decider.clone());
        request.decided_at = Some(Utc::now());
        request.comment = comment;

        info!(approval_id = %id, decider = %decider, status = status.as_str(), "approval decided");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<ApprovalRequest> {
        self.requests.read().get(id).cloned()
    }

    /// Pending requests, excluding any whose deadline has already passed.
    pub fn pending(&self) -> Vec<ApprovalRequest> {
        let now = Utc::now();
        self.requests
            .read()
            .values()
            .filter(|r| r.status == ApprovalStatus::Pending && now <= r.expires_at)
            .cloned()
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    /// Transition overdue pending requests to expired. Returns how many
    /// were expired.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut expired = 0;
        for request in self.requests.write().values_mut() {
            if request.status == ApprovalStatus::Pending && now > request.expires_at {
                request.status = ApprovalStatus::Expired;
                expired += 1;
                debug!(approval_id = %request.id, "approval request expired");
            }
        }
        expired
    }

    /// Spawn the periodic expiry sweeper.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let workflow = Arc::clone(self);
        // Sweep well inside the approval timeout.
        let period = std::time::Duration::from_secs(
            (workflow.timeout.num_seconds() as u64 / 10).clamp(1, 30),
        );
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = interval.tick() => {
                        let expired = workflow.sweep_expired();
                        if expired > 0 {
                            info!(expired, "expired stale approval requests");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workflow(timeout_secs: u64) -> ApprovalWorkflow {
        ApprovalWorkflow::new(&ApprovalConfig {
            auto_approve_timeout_secs: timeout_secs,
            require_approval: true,
        })
    }

    #[test]
    fn test_request_and_approve() {
        let wf = workflow(300);
        let outcome = wf.request(
            ActionType::DeviceQuarantine,
            json!({"user":"alice"}),
            "insider threat",
            Severity::High,
            false,
        );
        let RequestOutcome::Pending { id, .. } = outcome else {
            panic!("expected pending outcome");
        };
        assert_eq!(wf.pending_count(), 1);

        wf.approve(&id, "operator", Some("confirmed".to_string()))
            .unwrap();
        let request = wf.get(&id).unwrap();
        assert_eq!(request.status, ApprovalStatus::Approved);
        assert_eq!(request.decided_by.as_deref(), Some("operator"));
        assert_eq!(wf.pending_count(), 0);
    }

    #[test]
    fn test_critical_auto_approve_is_synchronous() {
        let wf = workflow(300);
        let outcome = wf.request(
            ActionType::NetworkIsolation,
            json!({}),
            "ransomware",
            Severity::Critical,
            true,
        );
        let RequestOutcome::AutoApproved { id } = outcome else {
            panic!("expected auto-approved outcome");
        };
        let request = wf.get(&id).unwrap();
        assert_eq!(request.status, ApprovalStatus::AutoApproved);
        assert_eq!(request.decided_by.as_deref(), Some("auto_approved"));
    }

    #[test]
    fn test_double_decision_rejected() {
        let wf = workflow(300);
        let RequestOutcome::Pending { id, .. } = wf.request(
            ActionType::Failover,
            json!({}),
            "r",
            Severity::High,
            false,
        ) else {
            panic!();
        };
        wf.approve(&id, "op", None).unwrap();
        let err = wf.reject(&id, "op2", None).unwrap_err();
        assert!(matches!(err, PipelineError::ApprovalWrongState { .. }));
    }

    #[test]
    fn test_unknown_id() {
        let wf = workflow(300);
        assert!(matches!(
            wf.approve("nope", "op", None).unwrap_err(),
            PipelineError::ApprovalNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_expired_request_cannot_be_approved() {
        let wf = workflow(1);
        let RequestOutcome::Pending { id, .. } = wf.request(
            ActionType::DeviceQuarantine,
            json!({}),
            "r",
            Severity::High,
            false,
        ) else {
            panic!();
        };

        tokio::time::sleep(std::time::Duration::from_secs(2)).await;

        let err = wf.approve(&id, "op", None).unwrap_err();
        assert!(matches!(err, PipelineError::ApprovalExpired(_)));
        assert_eq!(wf.get(&id).unwrap().status, ApprovalStatus::Expired);
        assert!(wf.pending().iter().all(|r| r.id != id));
    }

    #[tokio::test]
    async fn test_sweeper_expires() {
        let wf = workflow(1);
        wf.request(
            ActionType::TrafficBlocking,
            json!({}),
            "r",
            Severity::Medium,
            false,
        );
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        assert_eq!(wf.sweep_expired(), 1);
        assert_eq!(wf.pending_count(), 0);
    }
}
