//! Structured telemetry events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type of telemetry event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Agent execution started
    #[serde(rename = "agent.start")]
    AgentStart,
    /// Agent execution ended
    #[serde(rename = "agent.end")]
    AgentEnd,
    /// Agent execution failed
    #[serde(rename = "agent.error")]
    AgentError,
    /// Tool invocation started
    #[serde(rename = "tool.start")]
    ToolStart,
    /// Tool invocation ended
    #[serde(rename = "tool.end")]
    ToolEnd,
    /// Tool invocation failed
    #[serde(rename = "tool.error")]
    ToolError,
    /// LLM call started
    #[serde(rename = "llm.start")]
    LlmStart,
    /// LLM call ended
    #[serde(rename = "llm.end")]
    LlmEnd,
    /// LLM call failed
    #[serde(rename = "llm.error")]
    LlmError,
    /// A metric sample was recorded
    #[serde(rename = "metric.recorded")]
    MetricRecorded,
    /// A span completed
    #[serde(rename = "span.ended")]
    SpanEnded,
    /// Periodic system health report
    #[serde(rename = "system.health")]
    SystemHealth,
    /// Application-defined event
    #[serde(rename = "custom")]
    Custom,
}

impl EventType {
    /// Dotted wire name of the event type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgentStart => "agent.start",
            Self::AgentEnd => "agent.end",
            Self::AgentError => "agent.error",
            Self::ToolStart => "tool.start",
            Self::ToolEnd => "tool.end",
            Self::ToolError => "tool.error",
            Self::LlmStart => "llm.start",
            Self::LlmEnd => "llm.end",
            Self::LlmError => "llm.error",
            Self::MetricRecorded => "metric.recorded",
            Self::SpanEnded => "span.ended",
            Self::SystemHealth => "system.health",
            Self::Custom => "custom",
        }
    }

    /// Whether this type denotes a failure
    pub fn is_error(&self) -> bool {
        matches!(self, Self::AgentError | Self::ToolError | Self::LlmError)
    }

    /// Severity derived from the type name: error-kinded types are errors,
    /// everything else is informational
    pub fn default_severity(&self) -> EventSeverity {
        if self.is_error() {
            EventSeverity::Error
        } else {
            EventSeverity::Info
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a telemetry event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    /// Diagnostic detail
    Debug,
    /// Routine information
    #[default]
    Info,
    /// Something unexpected but recoverable
    Warning,
    /// A failure
    Error,
    /// A failure requiring immediate attention
    Critical,
}

impl EventSeverity {
    /// Lowercase wire name of the severity
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

/// An immutable structured telemetry event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier
    pub event_id: Uuid,

    /// Type of event
    pub event_type: EventType,

    /// When the event occurred
    pub timestamp: DateTime<Utc>,

    /// Severity level
    pub severity: EventSeverity,

    /// Origin of the event (e.g. "agent:researcher", "tool:search")
    pub source: String,

    /// Human-readable message
    pub message: String,

    /// Structured payload
    pub data: serde_json::Value,

    /// Structured execution context
    pub context: serde_json::Value,
}

impl Event {
    /// Create an event timestamped now, with severity derived from the type
    pub fn new(event_type: EventType, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            timestamp: Utc::now(),
            severity: event_type.default_severity(),
            source: source.into(),
            message: message.into(),
            data: serde_json::json!({}),
            context: serde_json::json!({}),
        }
    }

    /// Override the derived severity
    #[must_use]
    pub fn with_severity(mut self, severity: EventSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Attach a structured payload
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Attach structured context
    #[must_use]
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}
