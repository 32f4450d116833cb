//! Event handler trait and stock implementations

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::models::{Event, EventSeverity, EventType};

/// A subscriber on the event bus
///
/// Handlers are invoked synchronously in subscription order. A returned
/// error is logged by the bus and never stops delivery to later handlers.
pub trait EventHandler: Send + Sync {
    /// Unique handler name; subscribing a second handler under the same name
    /// replaces the first
    fn name(&self) -> &str;

    /// Process one event
    fn handle(&self, event: &Event) -> Result<()>;
}

/// Forwards events to the `tracing` subscriber at the event's severity
pub struct LoggingEventHandler {
    name: String,
}

impl LoggingEventHandler {
    /// Create a logging handler with the default name
    pub fn new() -> Self {
        Self::named("logging_handler")
    }

    /// Create a logging handler with an explicit name
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LoggingEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for LoggingEventHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, event: &Event) -> Result<()> {
        let event_type = event.event_type.as_str();
        match event.severity {
            EventSeverity::Debug => {
                debug!(source = %event.source, "[{}] {}", event_type, event.message);
            }
            EventSeverity::Info => {
                info!(source = %event.source, "[{}] {}", event_type, event.message);
            }
            EventSeverity::Warning => {
                warn!(source = %event.source, "[{}] {}", event_type, event.message);
            }
            EventSeverity::Error | EventSeverity::Critical => {
                error!(source = %event.source, "[{}] {}", event_type, event.message);
            }
        }
        Ok(())
    }
}

/// Invokes a closure for every event
pub struct CallbackEventHandler {
    name: String,
    callback: Box<dyn Fn(&Event) -> Result<()> + Send + Sync>,
}

impl CallbackEventHandler {
    /// Create a callback handler
    pub fn new(
        name: impl Into<String>,
        callback: impl Fn(&Event) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            callback: Box::new(callback),
        }
    }
}

impl EventHandler for CallbackEventHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, event: &Event) -> Result<()> {
        (self.callback)(event)
    }
}

/// Forwards only events of the listed types to a wrapped handler
pub struct FilteredEventHandler {
    name: String,
    event_types: Vec<EventType>,
    inner: Box<dyn EventHandler>,
}

impl FilteredEventHandler {
    /// Wrap a handler with a type filter
    pub fn new(
        name: impl Into<String>,
        event_types: Vec<EventType>,
        inner: impl EventHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            event_types,
            inner: Box::new(inner),
        }
    }
}

impl EventHandler for FilteredEventHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, event: &Event) -> Result<()> {
        if self.event_types.contains(&event.event_type) {
            self.inner.handle(event)?;
        }
        Ok(())
    }
}

/// Captures events in memory; useful for tests and short-lived inspection
#[derive(Default)]
pub struct MemoryEventHandler {
    name: String,
    events: Mutex<Vec<Event>>,
}

impl MemoryEventHandler {
    /// Create a capturing handler
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Copy of the captured events, optionally filtered by type
    pub fn events(&self, event_type: Option<EventType>) -> Vec<Event> {
        let events = self.events.lock();
        match event_type {
            Some(ty) => events.iter().filter(|e| e.event_type == ty).cloned().collect(),
            None => events.clone(),
        }
    }

    /// Number of captured events
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether no events were captured
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventHandler for MemoryEventHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, event: &Event) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
