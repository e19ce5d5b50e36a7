//! Alerting Module
//! ===============
//! Alert lifecycle management, multi-channel notification fan-out, and
//! escalation.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

pub mod alert_manager;
pub mod channels;
pub mod escalation;
pub mod notification;

pub use alert_manager::{Alert, AlertFilter, AlertManager, AlertStatus};
pub use channels::{ChatSink, EmailSink, WebhookSink};
pub use escalation::{EscalationManager, EscalationRule};
pub use notification::{NotificationService, SendResult};
