//! Error Types
//! ===========
//! Typed error taxonomy for the log pipeline. Stage boundaries report one
//! of these variants instead of unwinding across the stream.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use thiserror::Error;

/// Pipeline-level errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("parse failure: {0}")]
    Parse(String),

    #[error("enrichment failed in {enricher}: {reason}")]
    Enrichment { enricher: String, reason: String },

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("detector {detector} failed: {reason}")]
    Detector { detector: String, reason: String },

    #[error("actuator failure: {0}")]
    Actuator(String),

    #[error("circuit breaker {0} is open")]
    CircuitOpen(String),

    #[error("approval request not found: {0}")]
    ApprovalNotFound(String),

    #[error("approval request expired: {0}")]
    ApprovalExpired(String),

    #[error("approval {id} is {status}, expected {expected}")]
    ApprovalWrongState {
        id: String,
        status: String,
        expected: String,
    },

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("notification failed: {0}")]
    Notification(String),

    #[error("ingestion bus error: {0}")]
    Bus(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

impl From<serde_json::Error> for PipelineError {
    fn from(error: serde_json::Error) -> Self {
        PipelineError::Parse(error.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(error: std::io::Error) -> Self {
        PipelineError::Internal(error.to_string())
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(error: reqwest::Error) -> Self {
        PipelineError::Notification(error.to_string())
    }
}

impl PipelineError {
    /// Short machine-readable code used by the HTTP surface and audit records.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Parse(_) => "parse_error",
            PipelineError::Enrichment { .. } => "enrichment_error",
            PipelineError::ModelUnavailable(_) => "model_unavailable",
            PipelineError::Detector { .. } => "detector_error",
            PipelineError::Actuator(_) => "actuator_error",
            PipelineError::CircuitOpen(_) => "circuit_open",
            PipelineError::ApprovalNotFound(_) => "approval_not_found",
            PipelineError::ApprovalExpired(_) => "expired",
            PipelineError::ApprovalWrongState { .. } => "approval_wrong_state",
            PipelineError::Persistence(_) => "persistence_error",
            PipelineError::Notification(_) => "notification_error",
            PipelineError::Bus(_) => "bus_error",
            PipelineError::Config(_) => "config_error",
            PipelineError::Internal(_) => "internal_error",
        }
    }
}
