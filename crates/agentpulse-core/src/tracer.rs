//! Hierarchical span tracer
//!
//! Spans are grouped into traces by a shared trace id. Parent/child
//! relationships are threaded explicitly through [`SpanContext`] handles
//! passed at each call site; there is no shared implicit-parent stack, so
//! the tracer is safe for concurrent producers and spans may end in any
//! order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::events::EventBus;
use crate::metrics::MetricsRegistry;
use crate::models::{Event, EventType, Span, SpanContext, SpanStatus};

/// Well-known histogram fed with span durations when registered
pub const SPAN_DURATION_METRIC: &str = "span_duration";

/// Maximum length of stringified inputs attached as span attributes
const INPUT_PREVIEW_LEN: usize = 500;

/// Attribute map attached to spans at creation
pub type AttributeMap = serde_json::Map<String, Value>;

#[derive(Default)]
struct TracerState {
    active: HashMap<Uuid, Span>,
    completed: Vec<Span>,
}

/// Tracks active and completed spans for agent executions
///
/// The tracer holds the collector's registry and bus so that ending a span
/// can feed the span-duration histogram and emit a completion event.
pub struct AgentTracer {
    registry: Arc<MetricsRegistry>,
    bus: Arc<EventBus>,
    state: Mutex<TracerState>,
}

impl AgentTracer {
    /// Create a tracer wired to the given registry and event bus
    pub fn new(registry: Arc<MetricsRegistry>, bus: Arc<EventBus>) -> Self {
        Self {
            registry,
            bus,
            state: Mutex::new(TracerState::default()),
        }
    }

    /// Start a new trace rooted at an agent execution
    ///
    /// Creates a root span named `agent:<id>` carrying the agent id and any
    /// supplied context as attributes, and emits an `agent.start` event.
    pub fn start_trace(&self, agent_id: &str, context: Option<AttributeMap>) -> SpanContext {
        let trace_id = Uuid::new_v4();
        let mut span = Span::new(trace_id, None, format!("agent:{agent_id}"));
        span.add_attribute("agent_id", json!(agent_id));
        for (key, value) in context.unwrap_or_default() {
            span.add_attribute(key, value);
        }
        let ctx = span.context();

        self.state.lock().active.insert(ctx.span_id, span);

        self.bus.emit_agent_event(
            agent_id,
            EventType::AgentStart,
            "Agent execution started",
            json!({ "trace_id": trace_id }),
        );

        ctx
    }

    /// Start a span
    ///
    /// The trace id is taken from `trace_id` when given, otherwise from the
    /// parent; a span with neither starts a fresh "orphan" trace.
    pub fn start_span(
        &self,
        operation_name: &str,
        parent: Option<SpanContext>,
        trace_id: Option<Uuid>,
        attributes: Option<AttributeMap>,
    ) -> SpanContext {
        let trace_id = trace_id
            .or(parent.map(|p| p.trace_id))
            .unwrap_or_else(Uuid::new_v4);

        let mut span = Span::new(trace_id, parent.map(|p| p.span_id), operation_name);
        for (key, value) in attributes.unwrap_or_default() {
            span.add_attribute(key, value);
        }
        let ctx = span.context();

        self.state.lock().active.insert(ctx.span_id, span);
        ctx
    }

    /// Start a `tool:<name>` span with the tool input attached (truncated)
    pub fn trace_tool_call(
        &self,
        tool_name: &str,
        tool_input: &Value,
        parent: Option<SpanContext>,
    ) -> SpanContext {
        let mut attributes = AttributeMap::new();
        attributes.insert("tool_name".to_string(), json!(tool_name));
        attributes.insert("input".to_string(), json!(preview(tool_input)));
        self.start_span(&format!("tool:{tool_name}"), parent, None, Some(attributes))
    }

    /// Start an `llm:<model>` span with model and prompt size attached
    pub fn trace_llm_call(
        &self,
        model: &str,
        prompt_tokens: u32,
        parent: Option<SpanContext>,
    ) -> SpanContext {
        let mut attributes = AttributeMap::new();
        attributes.insert("model".to_string(), json!(model));
        attributes.insert("prompt_tokens".to_string(), json!(prompt_tokens));
        self.start_span(&format!("llm:{model}"), parent, None, Some(attributes))
    }

    /// Attach an attribute to an active span; no-op for unknown ids
    pub fn add_span_attribute(&self, span_id: Uuid, key: &str, value: Value) {
        if let Some(span) = self.state.lock().active.get_mut(&span_id) {
            span.add_attribute(key, value);
        }
    }

    /// Append a timestamped event to an active span; no-op for unknown ids
    pub fn add_span_event(&self, span_id: Uuid, name: &str, attributes: Value) {
        if let Some(span) = self.state.lock().active.get_mut(&span_id) {
            span.add_event(name, attributes);
        }
    }

    /// End an active span
    ///
    /// Unknown or already-ended span ids are tolerated as no-ops so that
    /// double-end races and late callbacks are harmless. Records the span
    /// duration into the `span_duration` histogram if one is registered and
    /// emits a `span.ended` event.
    pub fn end_span(&self, span_id: Uuid, status: SpanStatus, error: Option<String>) {
        let span = {
            let mut state = self.state.lock();
            let Some(mut span) = state.active.remove(&span_id) else {
                return;
            };
            span.end(status, error);
            state.completed.push(span.clone());
            span
        };

        // Metric and event work happens after the tracer lock is released;
        // an event handler may itself call back into the tracer.
        let duration_ms = span.duration_ms().unwrap_or(0.0);
        if let Some(metric) = self.registry.get(SPAN_DURATION_METRIC) {
            metric.record(duration_ms);
        }

        self.bus.emit(
            Event::new(EventType::SpanEnded, span.operation_name.clone(), "Span ended").with_data(
                json!({
                    "span_id": span_id,
                    "status": status,
                    "duration_ms": duration_ms,
                }),
            ),
        );
    }

    /// Force-end every active span, optionally scoped to one trace
    ///
    /// Used at shutdown so unterminated spans do not accumulate.
    pub fn end_trace(&self, trace_id: Option<Uuid>, status: SpanStatus) {
        let span_ids: Vec<Uuid> = {
            let state = self.state.lock();
            state
                .active
                .values()
                .filter(|s| trace_id.map_or(true, |id| s.trace_id == id))
                .map(|s| s.span_id)
                .collect()
        };
        for span_id in span_ids {
            self.end_span(span_id, status, None);
        }
    }

    /// Completed spans of one trace, in completion order
    pub fn trace(&self, trace_id: Uuid) -> Vec<Span> {
        self.state
            .lock()
            .completed
            .iter()
            .filter(|s| s.trace_id == trace_id)
            .cloned()
            .collect()
    }

    /// Completed spans with the given operation name
    pub fn spans_by_operation(&self, operation_name: &str) -> Vec<Span> {
        self.state
            .lock()
            .completed
            .iter()
            .filter(|s| s.operation_name == operation_name)
            .cloned()
            .collect()
    }

    /// Copy of every completed span
    pub fn all_spans(&self) -> Vec<Span> {
        self.state.lock().completed.clone()
    }

    /// Number of currently active spans
    pub fn active_span_count(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Number of completed spans retained
    pub fn completed_span_count(&self) -> usize {
        self.state.lock().completed.len()
    }

    /// Drop all active and completed spans
    pub fn clear_spans(&self) {
        let mut state = self.state.lock();
        state.active.clear();
        state.completed.clear();
    }

    /// Drop completed spans that ended before `now - retention`
    ///
    /// Active spans are never pruned; an in-flight trace survives any number
    /// of cleanup passes.
    pub fn cleanup_completed(&self, retention: Duration) {
        let retention = chrono::Duration::from_std(retention)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        let cutoff = Utc::now() - retention;
        self.state
            .lock()
            .completed
            .retain(|s| s.end_time.map_or(true, |end| end > cutoff));
    }

    /// Aggregate completed spans by operation name
    pub fn statistics(&self) -> TraceStatistics {
        let state = self.state.lock();
        let mut by_operation: HashMap<String, OperationStats> = HashMap::new();

        for span in &state.completed {
            let entry = by_operation
                .entry(span.operation_name.clone())
                .or_default();
            entry.count += 1;
            entry.total_duration_ms += span.duration_ms().unwrap_or(0.0);
            if span.status != SpanStatus::Ok {
                entry.errors += 1;
            }
        }

        for stats in by_operation.values_mut() {
            if stats.count > 0 {
                stats.avg_duration_ms = stats.total_duration_ms / stats.count as f64;
            }
        }

        TraceStatistics {
            total_spans: state.completed.len(),
            active_spans: state.active.len(),
            by_operation,
        }
    }
}

fn preview(value: &Value) -> String {
    let mut text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.len() > INPUT_PREVIEW_LEN {
        let mut cut = INPUT_PREVIEW_LEN;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

/// Aggregated view over completed spans
#[derive(Debug, Clone, Serialize)]
pub struct TraceStatistics {
    /// Completed span count
    pub total_spans: usize,
    /// Currently active span count
    pub active_spans: usize,
    /// Per-operation aggregates
    pub by_operation: HashMap<String, OperationStats>,
}

/// Per-operation aggregate over completed spans
#[derive(Debug, Clone, Default, Serialize)]
pub struct OperationStats {
    /// Completed spans with this operation name
    pub count: usize,
    /// Sum of durations in milliseconds
    pub total_duration_ms: f64,
    /// Average duration in milliseconds
    pub avg_duration_ms: f64,
    /// Spans that did not end OK
    pub errors: usize,
}
