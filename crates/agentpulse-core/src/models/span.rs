//! Span data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanStatus {
    /// Span is still open
    #[default]
    Pending,
    /// Operation completed successfully
    Ok,
    /// Operation failed
    Error,
}

/// Handle identifying a span within its trace
///
/// Passed explicitly to [`crate::tracer::AgentTracer::start_span`] to thread
/// parent/child relationships through call sites instead of inferring them
/// from shared tracer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanContext {
    /// Trace the span belongs to
    pub trace_id: Uuid,
    /// The span itself
    pub span_id: Uuid,
}

/// An event that occurred during a span
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanEvent {
    /// Event name
    pub name: String,

    /// When the event occurred
    pub timestamp: DateTime<Utc>,

    /// Event attributes
    pub attributes: serde_json::Value,
}

/// A timed unit of work within a trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    /// Unique identifier
    pub span_id: Uuid,

    /// Trace this span belongs to
    pub trace_id: Uuid,

    /// Parent span (None for root spans)
    pub parent_span_id: Option<Uuid>,

    /// Name of the operation
    pub operation_name: String,

    /// When the operation started
    pub start_time: DateTime<Utc>,

    /// When the operation ended (None while pending)
    pub end_time: Option<DateTime<Utc>>,

    /// Attributes attached while the span was open
    pub attributes: serde_json::Map<String, serde_json::Value>,

    /// Ordered events that occurred during the span
    pub events: Vec<SpanEvent>,

    /// Status of the operation
    pub status: SpanStatus,

    /// Error message (usually set alongside an error status)
    pub error: Option<String>,
}

impl Span {
    /// Create an open span starting now
    pub fn new(
        trace_id: Uuid,
        parent_span_id: Option<Uuid>,
        operation_name: impl Into<String>,
    ) -> Self {
        Self {
            span_id: Uuid::new_v4(),
            trace_id,
            parent_span_id,
            operation_name: operation_name.into(),
            start_time: Utc::now(),
            end_time: None,
            attributes: serde_json::Map::new(),
            events: Vec::new(),
            status: SpanStatus::Pending,
            error: None,
        }
    }

    /// The span's context handle
    pub fn context(&self) -> SpanContext {
        SpanContext {
            trace_id: self.trace_id,
            span_id: self.span_id,
        }
    }

    /// Attach an attribute
    pub fn add_attribute(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes.insert(key.into(), value);
    }

    /// Append a timestamped event
    pub fn add_event(&mut self, name: impl Into<String>, attributes: serde_json::Value) {
        self.events.push(SpanEvent {
            name: name.into(),
            timestamp: Utc::now(),
            attributes,
        });
    }

    /// Close the span with the given status
    pub fn end(&mut self, status: SpanStatus, error: Option<String>) {
        self.end_time = Some(Utc::now());
        self.status = status;
        self.error = error;
    }

    /// Whether the span has been closed
    pub fn is_ended(&self) -> bool {
        self.end_time.is_some()
    }

    /// Duration in milliseconds; undefined (None) while pending
    pub fn duration_ms(&self) -> Option<f64> {
        self.end_time
            .map(|end| (end - self.start_time).num_microseconds().unwrap_or(0) as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_is_undefined_while_pending() {
        let span = Span::new(Uuid::new_v4(), None, "work");
        assert_eq!(span.duration_ms(), None);
        assert!(!span.is_ended());
    }

    #[test]
    fn end_sets_status_and_nonnegative_duration() {
        let mut span = Span::new(Uuid::new_v4(), None, "work");
        span.end(SpanStatus::Ok, None);
        assert_eq!(span.status, SpanStatus::Ok);
        assert!(span.end_time.unwrap() >= span.start_time);
        assert!(span.duration_ms().unwrap() >= 0.0);
    }

    #[test]
    fn status_uses_uppercase_wire_names() {
        let json = serde_json::to_value(SpanStatus::Pending).unwrap();
        assert_eq!(json, serde_json::json!("PENDING"));
        let json = serde_json::to_value(SpanStatus::Ok).unwrap();
        assert_eq!(json, serde_json::json!("OK"));
    }
}
