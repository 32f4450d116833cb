//! Alert and notification data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational
    Info,
    /// Needs attention soon
    #[default]
    Warning,
    /// A failure
    Error,
    /// A failure requiring immediate attention
    Critical,
}

impl AlertSeverity {
    /// Lowercase wire name of the severity
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

/// Payload handed to alert handlers (collaborator boundary)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    /// Identifier of the triggered alert
    pub alert_id: String,

    /// Rule that produced the alert
    pub rule_id: String,

    /// When the alert triggered
    pub timestamp: DateTime<Utc>,

    /// Severity level
    pub severity: AlertSeverity,

    /// Human-readable message
    pub message: String,

    /// Whether an operator has acknowledged the alert
    pub acknowledged: bool,
}

/// A pending alert delivery
///
/// Lifecycle: created on enqueue, then either delivered on success or retried
/// up to the queue's limit, after which it is force-marked delivered (given
/// up). Callers distinguish success from give-up by comparing `retry_count`
/// against the queue's retry limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Unique identifier
    pub id: Uuid,

    /// Alert this notification delivers; dedup key
    pub alert_id: String,

    /// Severity carried over from the alert
    pub severity: AlertSeverity,

    /// Human-readable message
    pub message: String,

    /// When the notification was enqueued
    pub enqueued_at: DateTime<Utc>,

    /// Whether delivery finished (successfully or given up)
    pub delivered: bool,

    /// Failed delivery attempts so far
    pub retry_count: u32,
}

impl Notification {
    /// Create an undelivered notification timestamped now
    pub fn new(
        alert_id: impl Into<String>,
        severity: AlertSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_id: alert_id.into(),
            severity,
            message: message.into(),
            enqueued_at: Utc::now(),
            delivered: false,
            retry_count: 0,
        }
    }
}
