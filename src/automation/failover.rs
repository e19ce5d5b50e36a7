//! Failover Actuator
//! =================
//! Backup system activation behind an interface. The concrete DNS,
//! load-balancer and direct integrations live outside the pipeline.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::info;

use crate::error::{PipelineError, PipelineResult};

/// How a backup system takes over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    DnsSwitch,
    LoadBalancer,
    Direct,
}

/// Activates a configured backup system for a protected service
#[async_trait]
pub trait BackupActivator: Send + Sync {
    async fn activate(&self, system: &str, reason: &str) -> PipelineResult<Value>;
}

/// Record of an activation performed by the in-memory activator
#[derive(Debug, Clone, Serialize)]
pub struct ActivationRecord {
    pub system: String,
    pub kind: BackupKind,
    pub reason: String,
    pub activated_at: DateTime<Utc>,
}

/// In-memory activator over a static map of configured backup systems
#[derive(Debug, Default)]
pub struct InMemoryBackupActivator {
    systems: HashMap<String, BackupKind>,
    activations: DashMap<String, ActivationRecord>,
}

impl InMemoryBackupActivator {
    pub fn new(systems: HashMap<String, BackupKind>) -> Self {
        Self {
            systems,
            activations: DashMap::new(),
        }
    }

    pub fn activation(&self, system: &str) -> Option<ActivationRecord> {
        self.activations.get(system).map(|a| a.clone())
    }
}

#[async_trait]
impl BackupActivator for InMemoryBackupActivator {
    async fn activate(&self, system: &str, reason: &str) -> PipelineResult<Value> {
        let kind = *self.systems.get(system).ok_or_else(|| {
            PipelineError::Actuator(format!("backup system {system} not configured"))
        })?;

        let action = match kind {
            BackupKind::DnsSwitch => "DNS switched to backup",
            BackupKind::LoadBalancer => "load balancer updated",
            BackupKind::Direct => "backup system activated",
        };

        self.activations.insert(
            system.to_string(),
            ActivationRecord {
                system: system.to_string(),
                kind,
                reason: reason.to_string(),
                activated_at: Utc::now(),
            },
        );

        info!(system = %system, ?kind, reason = %reason, "backup activated");
        Ok(json!({ "system": system, "kind": kind, "actions": [action] }))
    }
}
