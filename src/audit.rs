//! Audit Logging
//! =============
//! Compliance trail for every state-changing action, persisted through
//! the document store.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

use crate::error::PipelineResult;
use crate::storage::DocStore;

const AUDIT_COLLECTION: &str = "audit_logs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Login,
    Logout,
    Create,
    Update,
    Delete,
    Read,
    Execute,
    Approve,
    Reject,
    ConfigChange,
    AutomationTriggered,
    IsolationApplied,
    FailoverActivated,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Login => "login",
            AuditAction::Logout => "logout",
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Read => "read",
            AuditAction::Execute => "execute",
            AuditAction::Approve => "approve",
            AuditAction::Reject => "reject",
            AuditAction::ConfigChange => "config_change",
            AuditAction::AutomationTriggered => "automation_triggered",
            AuditAction::IsolationApplied => "isolation_applied",
            AuditAction::FailoverActivated => "failover_activated",
        }
    }

    /// HTTP method to audit action, used by the gateway middleware.
    pub fn from_http_method(method: &str) -> Self {
        match method {
            "GET" => AuditAction::Read,
            "POST" => AuditAction::Create,
            "PUT" | "PATCH" => AuditAction::Update,
            "DELETE" => AuditAction::Delete,
            _ => AuditAction::Execute,
        }
    }
}

/// Filters for audit queries
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub user: Option<String>,
    pub action: Option<String>,
    pub resource: Option<String>,
}

pub struct AuditLogger {
    store: Arc<dyn DocStore>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn DocStore>) -> Self {
        Self { store }
    }

    /// Record an audit event. Audit failures are logged, never raised:
    /// the action that triggered them has already happened.
    pub async fn log(
        &self,
        action: AuditAction,
        user: &str,
        resource: &str,
        details: Value,
        success: bool,
        ip_address: Option<&str>,
    ) {
        let entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "action": action.as_str(),
            "user": user,
            "resource": resource,
            "details": details,
            "success": success,
            "ip_address": ip_address,
        });

        if let Err(err) = self.store.insert(AUDIT_COLLECTION, entry).await {
            error!(%err, "failed to persist audit entry");
            return;
        }

        info!(
            action = action.as_str(),
            user,
            resource,
            success,
            "audit event recorded"
        );
    }

    /// Filtered read over the audit trail, newest first.
    pub async fn query(&self, filter: &AuditFilter, limit: usize) -> PipelineResult<Vec<Value>> {
        let mut conditions = serde_json::Map::new();
        if let Some(user) = &filter.user {
            conditions.insert("user".to_string(), json!(user));
        }
        if let Some(action) = &filter.action {
            conditions.insert("action".to_string(), json!(action));
        }
        if let Some(resource) = &filter.resource {
            conditions.insert("resource".to_string(), json!(resource));
        }

        self.store
            .find(
                AUDIT_COLLECTION,
                &Value::Object(conditions),
                Some("timestamp"),
                0,
                limit,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryDocStore;

    #[test]
    fn test_http_method_mapping() {
        assert_eq!(AuditAction::from_http_method("GET"), AuditAction::Read);
        assert_eq!(AuditAction::from_http_method("POST"), AuditAction::Create);
        assert_eq!(AuditAction::from_http_method("PUT"), AuditAction::Update);
        assert_eq!(AuditAction::from_http_method("PATCH"), AuditAction::Update);
        assert_eq!(AuditAction::from_http_method("DELETE"), AuditAction::Delete);
        assert_eq!(AuditAction::from_http_method("OPTIONS"), AuditAction::Execute);
    }

    #[tokio::test]
    async fn test_log_and_query() {
        let store = Arc::new(MemoryDocStore::new());
        let audit = AuditLogger::new(store);

        audit
            .log(
                AuditAction::Approve,
                "operator",
                "/automation/approvals/abc",
                json!({"comment":"ok"}),
                true,
                Some("10.1.1.1"),
            )
            .await;
        audit
            .log(AuditAction::Read, "viewer", "/threats", json!({}), true, None)
            .await;

        let all = audit.query(&AuditFilter::default(), 10).await.unwrap();
        assert_eq!(all.len(), 2);

        let approvals = audit
            .query(
                &AuditFilter {
                    action: Some("approve".to_string()),
                    ..Default::default()
                },
                10,
            )
            .await
            .unwrap();
        assert_eq!(approvals.len(), 1);
        assert_eq!(approvals[0]["user"], "operator");
    }
}
