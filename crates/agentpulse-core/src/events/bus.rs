//! Synchronous event bus with retention-bounded history

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::{Event, EventType};

use super::handlers::EventHandler;

/// Event counts grouped by type and severity
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventStats {
    /// Total events in history
    pub total_events: usize,
    /// Counts keyed by event type wire name
    pub by_type: HashMap<String, u64>,
    /// Counts keyed by severity wire name
    pub by_severity: HashMap<String, u64>,
}

struct BusState {
    handlers: Vec<Arc<dyn EventHandler>>,
    history: Vec<Event>,
}

/// Fans structured events out to subscribed handlers and keeps an
/// append-only history
///
/// One lock guards both the handler list and the history; handlers are
/// dispatched outside the lock (against a snapshot of the subscription
/// list) so a handler may itself emit without deadlocking.
pub struct EventBus {
    state: Mutex<BusState>,
}

impl EventBus {
    /// Create a bus with no subscribers
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BusState {
                handlers: Vec::new(),
                history: Vec::new(),
            }),
        }
    }

    /// Subscribe a handler, keyed by its name
    ///
    /// A duplicate name replaces the existing handler in place, preserving
    /// its position in delivery order.
    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) {
        let mut state = self.state.lock();
        if let Some(existing) = state
            .handlers
            .iter_mut()
            .find(|h| h.name() == handler.name())
        {
            *existing = handler;
        } else {
            state.handlers.push(handler);
        }
    }

    /// Remove a handler by name
    pub fn unsubscribe(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        let before = state.handlers.len();
        state.handlers.retain(|h| h.name() != name);
        if state.handlers.len() == before {
            return Err(Error::not_found("event handler", name));
        }
        Ok(())
    }

    /// Append an event to the history and deliver it to every handler in
    /// subscription order
    ///
    /// A handler failure is logged and does not stop delivery to the
    /// remaining handlers or propagate to the caller.
    pub fn emit(&self, event: Event) {
        let handlers = {
            let mut state = self.state.lock();
            state.history.push(event.clone());
            state.handlers.clone()
        };

        for handler in handlers {
            if let Err(e) = handler.handle(&event) {
                warn!(handler = handler.name(), error = %e, "event handler failed");
            }
        }
    }

    /// Emit an event sourced from an agent; severity is derived from the type
    pub fn emit_agent_event(
        &self,
        agent_id: &str,
        event_type: EventType,
        message: impl Into<String>,
        data: serde_json::Value,
    ) {
        self.emit(Event::new(event_type, format!("agent:{agent_id}"), message).with_data(data));
    }

    /// Emit an event sourced from a tool; severity is derived from the type
    pub fn emit_tool_event(
        &self,
        tool_name: &str,
        event_type: EventType,
        message: impl Into<String>,
        data: serde_json::Value,
    ) {
        self.emit(Event::new(event_type, format!("tool:{tool_name}"), message).with_data(data));
    }

    /// Emit an event sourced from an LLM; severity is derived from the type
    pub fn emit_llm_event(
        &self,
        model: &str,
        event_type: EventType,
        message: impl Into<String>,
        data: serde_json::Value,
    ) {
        self.emit(Event::new(event_type, format!("llm:{model}"), message).with_data(data));
    }

    /// Copy of the history, optionally filtered by type
    pub fn events(&self, event_type: Option<EventType>) -> Vec<Event> {
        let state = self.state.lock();
        match event_type {
            Some(ty) => state
                .history
                .iter()
                .filter(|e| e.event_type == ty)
                .cloned()
                .collect(),
            None => state.history.clone(),
        }
    }

    /// Events at or after the given timestamp
    ///
    /// Linear scan; acceptable because the history is retention-bounded by
    /// the collector's cleanup pass.
    pub fn events_since(
        &self,
        timestamp: DateTime<Utc>,
        event_type: Option<EventType>,
    ) -> Vec<Event> {
        let state = self.state.lock();
        state
            .history
            .iter()
            .filter(|e| e.timestamp >= timestamp)
            .filter(|e| event_type.map_or(true, |ty| e.event_type == ty))
            .cloned()
            .collect()
    }

    /// Counts grouped by type and severity
    pub fn stats(&self) -> EventStats {
        let state = self.state.lock();
        let mut stats = EventStats {
            total_events: state.history.len(),
            ..EventStats::default()
        };
        for event in &state.history {
            *stats
                .by_type
                .entry(event.event_type.as_str().to_string())
                .or_insert(0) += 1;
            *stats
                .by_severity
                .entry(event.severity.as_str().to_string())
                .or_insert(0) += 1;
        }
        stats
    }

    /// Number of events in history
    pub fn len(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.state.lock().history.is_empty()
    }

    /// Drop the entire history
    pub fn clear_history(&self) {
        self.state.lock().history.clear();
    }

    /// Drop history entries older than `now - retention`
    pub fn cleanup_old_events(&self, retention: Duration) {
        let retention = chrono::Duration::from_std(retention)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        let cutoff = Utc::now() - retention;
        self.state.lock().history.retain(|e| e.timestamp > cutoff);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::handlers::{CallbackEventHandler, MemoryEventHandler};
    use crate::models::EventSeverity;

    fn event(event_type: EventType) -> Event {
        Event::new(event_type, "test", "test event")
    }

    #[test]
    fn emit_delivers_in_subscription_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            bus.subscribe(Arc::new(CallbackEventHandler::new(name, move |_| {
                seen.lock().push(name);
                Ok(())
            })));
        }

        bus.emit(event(EventType::Custom));
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn duplicate_name_replaces_handler() {
        let bus = EventBus::new();
        let first = Arc::new(MemoryEventHandler::new("capture"));
        let second = Arc::new(MemoryEventHandler::new("capture"));
        bus.subscribe(first.clone());
        bus.subscribe(second.clone());

        bus.emit(event(EventType::Custom));
        assert!(first.is_empty());
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn unsubscribe_unknown_name_is_not_found() {
        let bus = EventBus::new();
        let err = bus.unsubscribe("ghost").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn failing_handler_does_not_stop_delivery() {
        let bus = EventBus::new();
        bus.subscribe(Arc::new(CallbackEventHandler::new("boom", |_| {
            Err(Error::config("handler failure"))
        })));
        let capture = Arc::new(MemoryEventHandler::new("capture"));
        bus.subscribe(capture.clone());

        bus.emit(event(EventType::Custom));
        assert_eq!(capture.len(), 1);
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn convenience_emitters_derive_source_and_severity() {
        let bus = EventBus::new();
        bus.emit_agent_event(
            "researcher",
            EventType::AgentStart,
            "started",
            serde_json::json!({}),
        );
        bus.emit_llm_event(
            "some-model",
            EventType::LlmError,
            "call failed",
            serde_json::json!({}),
        );

        let events = bus.events(None);
        assert_eq!(events[0].source, "agent:researcher");
        assert_eq!(events[0].severity, EventSeverity::Info);
        assert_eq!(events[1].source, "llm:some-model");
        assert_eq!(events[1].severity, EventSeverity::Error);
    }

    #[test]
    fn stats_group_by_type_and_severity() {
        let bus = EventBus::new();
        bus.emit(event(EventType::AgentStart));
        bus.emit(event(EventType::AgentStart));
        bus.emit(event(EventType::ToolError));

        let stats = bus.stats();
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.by_type["agent.start"], 2);
        assert_eq!(stats.by_type["tool.error"], 1);
        assert_eq!(stats.by_severity["info"], 2);
        assert_eq!(stats.by_severity["error"], 1);
    }

    #[test]
    fn events_since_filters_by_timestamp_and_type() {
        let bus = EventBus::new();
        bus.emit(event(EventType::AgentStart));
        std::thread::sleep(Duration::from_millis(5));
        let marker = Utc::now();
        bus.emit(event(EventType::ToolStart));

        let since = bus.events_since(marker, None);
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].event_type, EventType::ToolStart);
        assert!(bus.events_since(marker, Some(EventType::AgentStart)).is_empty());
    }

    #[test]
    fn cleanup_bounds_history() {
        let bus = EventBus::new();
        bus.emit(event(EventType::Custom));
        bus.cleanup_old_events(Duration::ZERO);
        assert!(bus.is_empty());
    }
}
