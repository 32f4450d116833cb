//! Data models for AgentPulse

mod event;
mod metric;
mod notification;
mod span;

pub use event::{Event, EventSeverity, EventType};
pub use metric::{MetricDefinition, MetricKind, MetricValue, TagMap};
pub use notification::{AlertPayload, AlertSeverity, Notification};
pub use span::{Span, SpanContext, SpanEvent, SpanStatus};
