//! Telemetry collector - the central recording and export orchestrator
//!
//! Owns the metric registry, event bus, span tracer, and resource monitor,
//! funnels agent/LLM/tool recordings through all of them, and runs the
//! periodic export and cleanup loop.

mod monitor;

pub use monitor::{MonitorSummary, ResourceMonitor, ResourceStats, SystemSample};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::TelemetryConfig;
use crate::error::Result;
use crate::events::{EventBus, EventStats};
use crate::export::{Exporter, JsonExporter, MetricsSnapshot};
use crate::metrics::{Metric, MetricOverview, MetricsRegistry};
use crate::models::{Event, EventType, Span, SpanStatus, TagMap};
use crate::tracer::{AgentTracer, AttributeMap, TraceStatistics};

/// Histogram of end-to-end agent execution durations, milliseconds
pub const AGENT_EXECUTION_DURATION: &str = "agent_execution_duration";
/// Counter of successful agent executions
pub const AGENT_SUCCESS_RATE: &str = "agent_success_rate";
/// Counter of tokens consumed by agent executions
pub const AGENT_TOKENS_USED: &str = "agent_tokens_used";
/// Histogram of LLM call latencies, milliseconds
pub const LLM_LATENCY_MS: &str = "llm_latency_ms";
/// Histogram of tool execution durations, milliseconds
pub const TOOL_EXECUTION_DURATION: &str = "tool_execution_duration";
/// Histogram of completed span durations, milliseconds
pub const SPAN_DURATION: &str = crate::tracer::SPAN_DURATION_METRIC;

/// How long collector shutdown waits for the export task to finish
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Point-in-time summary across every telemetry store
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    /// When the summary was taken
    pub timestamp: DateTime<Utc>,
    /// Overview of every registered metric
    pub metrics: std::collections::BTreeMap<String, MetricOverview>,
    /// Event history counts
    pub events: EventStats,
    /// Span aggregates
    pub traces: TraceStatistics,
    /// Resource sampler aggregates
    pub system: MonitorSummary,
}

/// Liveness report for health endpoints
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Whether the export loop is running
    pub running: bool,
    /// Latest resource sample, if the monitor has taken one
    pub system: Option<SystemSample>,
    /// Registered metric count
    pub metric_count: usize,
    /// Retained event count
    pub event_count: usize,
    /// In-flight span count
    pub active_spans: usize,
    /// Retained completed-span count
    pub completed_spans: usize,
}

/// Central telemetry engine
///
/// Thread-safe; recording methods are synchronous and cheap, the export
/// pass runs on a background tokio task. Exporter registration and the
/// export pass share one async mutex so a pass always sees a stable
/// exporter list.
pub struct TelemetryCollector {
    registry: Arc<MetricsRegistry>,
    bus: Arc<EventBus>,
    tracer: Arc<AgentTracer>,
    monitor: Arc<ResourceMonitor>,
    exporters: tokio::sync::Mutex<Vec<Arc<dyn Exporter>>>,
    export_interval: Duration,
    retention: Mutex<Duration>,
    running: AtomicBool,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
    export_task: Mutex<Option<JoinHandle<()>>>,
}

impl TelemetryCollector {
    /// Build a collector and its stores from configuration
    pub fn new(config: &TelemetryConfig) -> Self {
        let registry = Arc::new(MetricsRegistry::new());
        let bus = Arc::new(EventBus::new());
        let tracer = Arc::new(AgentTracer::new(Arc::clone(&registry), Arc::clone(&bus)));
        let monitor = Arc::new(ResourceMonitor::new(&config.monitor));

        Self {
            registry,
            bus,
            tracer,
            monitor,
            exporters: tokio::sync::Mutex::new(Vec::new()),
            export_interval: Duration::from_secs(config.collector.export_interval_secs),
            retention: Mutex::new(Duration::from_secs(
                u64::from(config.collector.retention_days) * 24 * 60 * 60,
            )),
            running: AtomicBool::new(false),
            shutdown_tx: Mutex::new(None),
            export_task: Mutex::new(None),
        }
    }

    /// The metric registry
    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    /// The event bus
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The span tracer
    pub fn tracer(&self) -> &Arc<AgentTracer> {
        &self.tracer
    }

    /// The resource monitor
    pub fn monitor(&self) -> &Arc<ResourceMonitor> {
        &self.monitor
    }

    /// Replace the retention window used by the cleanup pass
    pub fn set_retention(&self, retention: Duration) {
        *self.retention.lock() = retention;
    }

    /// Start the resource sampler and the periodic export/cleanup loop
    ///
    /// Idempotent; a second call while running is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        self.monitor.start();

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        let collector = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(collector.export_interval);
            // The first interval tick fires immediately; skip it so the
            // first export happens one interval after startup.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !collector.export_all().await {
                            debug!("export pass completed with failures");
                        }
                        collector.cleanup_old_data();
                    }
                    _ = shutdown_rx.recv() => {
                        info!("telemetry collector stopping");
                        break;
                    }
                }
            }
        });
        *self.export_task.lock() = Some(handle);
        info!(interval_secs = self.export_interval.as_secs(), "telemetry collector started");
    }

    /// Stop the export loop and the resource sampler
    ///
    /// Waits up to five seconds for the export task to finish its current
    /// pass; a task that overruns is left to finish on its own.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);

        let shutdown_tx = self.shutdown_tx.lock().take();
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(()).await;
        }

        let handle = self.export_task.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("export task did not stop within the shutdown grace period");
            }
        }

        self.monitor.stop();
    }

    /// Whether the export loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register an exporter
    pub async fn add_exporter(&self, exporter: Arc<dyn Exporter>) {
        self.exporters.lock().await.push(exporter);
    }

    /// Remove an exporter by name; returns whether one was removed
    pub async fn remove_exporter(&self, name: &str) -> bool {
        let mut exporters = self.exporters.lock().await;
        let before = exporters.len();
        exporters.retain(|e| e.name() != name);
        exporters.len() != before
    }

    /// Run one export pass over every registered exporter
    ///
    /// Every exporter receives the same snapshot; a failing exporter is
    /// logged and does not block the others. Returns `false` if any
    /// exporter failed or none are registered.
    pub async fn export_all(&self) -> bool {
        let exporters = self.exporters.lock().await;
        if exporters.is_empty() {
            return false;
        }

        let metrics = self.registry.export_snapshot();
        let events = self.bus.events(None);

        let mut all_ok = true;
        for exporter in exporters.iter() {
            if let Err(e) = exporter.export(&metrics).await {
                warn!(exporter = exporter.name(), error = %e, "metrics export failed");
                all_ok = false;
            }
            if let Err(e) = exporter.export_events(&events).await {
                warn!(exporter = exporter.name(), error = %e, "events export failed");
                all_ok = false;
            }
        }
        all_ok
    }

    /// Prune metric samples, event history, and completed spans past the
    /// retention window
    pub fn cleanup_old_data(&self) {
        let retention = *self.retention.lock();
        self.registry.cleanup_old_values(retention);
        self.bus.cleanup_old_events(retention);
        self.tracer.cleanup_completed(retention);
    }

    /// Record one completed agent execution
    ///
    /// Creates and ends a root trace span carrying the outcome, feeds the
    /// duration histogram and the success/token counters, and emits an
    /// `agent.end` or `agent.error` event. A metric name already bound to a
    /// different kind is a fatal error at this call site.
    pub fn record_agent_execution(
        &self,
        agent_id: &str,
        duration_ms: f64,
        success: bool,
        tokens_used: u64,
        error: Option<&str>,
        metadata: Option<AttributeMap>,
    ) -> Result<()> {
        let ctx = self.tracer.start_trace(agent_id, metadata);
        self.tracer
            .add_span_attribute(ctx.span_id, "duration_ms", json!(duration_ms));
        self.tracer
            .add_span_attribute(ctx.span_id, "tokens_used", json!(tokens_used));
        if let Some(error) = error {
            self.tracer
                .add_span_attribute(ctx.span_id, "error", json!(error));
        }

        let mut tags = TagMap::new();
        tags.insert("agent".to_string(), agent_id.to_string());

        self.registry
            .histogram(AGENT_EXECUTION_DURATION, "Agent execution duration", Some("ms"), None)?
            .record_with_tags(duration_ms, tags.clone());
        if success {
            self.registry
                .counter(AGENT_SUCCESS_RATE, "Successful agent executions", None)?
                .add_with_tags(1.0, tags.clone());
        }
        self.registry
            .counter(AGENT_TOKENS_USED, "Tokens consumed by agent executions", Some("tokens"))?
            .add_with_tags(tokens_used as f64, tags);

        let status = if success { SpanStatus::Ok } else { SpanStatus::Error };
        self.tracer
            .end_span(ctx.span_id, status, error.map(str::to_string));

        let event_type = if success { EventType::AgentEnd } else { EventType::AgentError };
        self.bus.emit_agent_event(
            agent_id,
            event_type,
            "Agent execution recorded",
            json!({
                "trace_id": ctx.trace_id,
                "duration_ms": duration_ms,
                "tokens_used": tokens_used,
                "error": error,
            }),
        );
        Ok(())
    }

    /// Record one LLM call
    pub fn record_llm_call(
        &self,
        model: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
        latency_ms: f64,
        cost: Option<f64>,
        error: Option<&str>,
    ) -> Result<()> {
        let ctx = self.tracer.trace_llm_call(model, prompt_tokens, None);
        self.tracer
            .add_span_attribute(ctx.span_id, "completion_tokens", json!(completion_tokens));
        self.tracer
            .add_span_attribute(ctx.span_id, "latency_ms", json!(latency_ms));
        if let Some(cost) = cost {
            self.tracer.add_span_attribute(ctx.span_id, "cost", json!(cost));
        }

        let mut tags = TagMap::new();
        tags.insert("model".to_string(), model.to_string());
        self.registry
            .histogram(LLM_LATENCY_MS, "LLM call latency", Some("ms"), None)?
            .record_with_tags(latency_ms, tags);

        let status = if error.is_some() { SpanStatus::Error } else { SpanStatus::Ok };
        self.tracer
            .end_span(ctx.span_id, status, error.map(str::to_string));
        Ok(())
    }

    /// Record one tool execution
    pub fn record_tool_execution(
        &self,
        tool_name: &str,
        duration_ms: f64,
        success: bool,
        error: Option<&str>,
    ) -> Result<()> {
        let mut attributes = AttributeMap::new();
        attributes.insert("tool_name".to_string(), json!(tool_name));
        attributes.insert("duration_ms".to_string(), json!(duration_ms));
        let ctx = self
            .tracer
            .start_span(&format!("tool:{tool_name}"), None, None, Some(attributes));

        let mut tags = TagMap::new();
        tags.insert("tool".to_string(), tool_name.to_string());
        self.registry
            .histogram(TOOL_EXECUTION_DURATION, "Tool execution duration", Some("ms"), None)?
            .record_with_tags(duration_ms, tags);

        let status = if success { SpanStatus::Ok } else { SpanStatus::Error };
        self.tracer
            .end_span(ctx.span_id, status, error.map(str::to_string));
        Ok(())
    }

    /// Emit an event onto the bus
    pub fn emit_event(&self, event: Event) {
        self.bus.emit(event);
    }

    /// Look up a metric by name
    pub fn get_metric(&self, name: &str) -> Option<Metric> {
        self.registry.get(name)
    }

    /// Summary across metrics, events, spans, and resource samples
    pub fn metrics_summary(&self) -> MetricsSummary {
        MetricsSummary {
            timestamp: Utc::now(),
            metrics: self.registry.overview(),
            events: self.bus.stats(),
            traces: self.tracer.statistics(),
            system: self.monitor.summary(),
        }
    }

    /// Liveness report
    pub fn health_status(&self) -> HealthStatus {
        let traces = self.tracer.statistics();
        HealthStatus {
            running: self.is_running(),
            system: self.monitor.latest(),
            metric_count: self.registry.len(),
            event_count: self.bus.len(),
            active_spans: traces.active_spans,
            completed_spans: traces.total_spans,
        }
    }

    /// Completed spans, optionally restricted to one agent's traces
    pub fn traces(&self, agent_id: Option<&str>) -> Vec<Span> {
        let spans = self.tracer.all_spans();
        match agent_id {
            None => spans,
            Some(id) => {
                let root = format!("agent:{id}");
                let trace_ids: std::collections::HashSet<_> = spans
                    .iter()
                    .filter(|s| s.operation_name == root)
                    .map(|s| s.trace_id)
                    .collect();
                spans
                    .into_iter()
                    .filter(|s| trace_ids.contains(&s.trace_id))
                    .collect()
            }
        }
    }

    /// Events at or after the given timestamp
    pub fn events_since(&self, timestamp: DateTime<Utc>) -> Vec<Event> {
        self.bus.events_since(timestamp, None)
    }

    /// One-shot JSON export of the current metrics and events into `dir`
    pub async fn export_to_file(&self, dir: impl AsRef<std::path::Path>) -> Result<()> {
        let exporter = JsonExporter::new(dir)?;
        exporter.export(&self.registry.export_snapshot()).await?;
        exporter.export_events(&self.bus.events(None)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::thread;

    struct CapturingExporter {
        snapshots: Mutex<Vec<MetricsSnapshot>>,
    }

    impl CapturingExporter {
        fn new() -> Self {
            Self {
                snapshots: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl Exporter for CapturingExporter {
        fn name(&self) -> &str {
            "capturing"
        }

        async fn export(&self, metrics: &MetricsSnapshot) -> Result<()> {
            self.snapshots.lock().push(metrics.clone());
            Ok(())
        }

        async fn export_events(&self, _events: &[Event]) -> Result<()> {
            Ok(())
        }
    }

    struct FailingExporter;

    #[async_trait::async_trait]
    impl Exporter for FailingExporter {
        fn name(&self) -> &str {
            "failing"
        }

        async fn export(&self, _metrics: &MetricsSnapshot) -> Result<()> {
            Err(Error::export("sink unavailable"))
        }

        async fn export_events(&self, _events: &[Event]) -> Result<()> {
            Err(Error::export("sink unavailable"))
        }
    }

    fn collector() -> Arc<TelemetryCollector> {
        Arc::new(TelemetryCollector::new(&TelemetryConfig::default()))
    }

    #[test]
    fn concurrent_recordings_land_every_sample() {
        let collector = collector();
        let threads: Vec<_> = (0..5)
            .map(|i| {
                let collector = Arc::clone(&collector);
                thread::spawn(move || {
                    for _ in 0..100 {
                        collector
                            .record_agent_execution(
                                &format!("agent-{i}"),
                                12.5,
                                true,
                                50,
                                None,
                                None,
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let hist = match collector.get_metric(AGENT_EXECUTION_DURATION).unwrap() {
            Metric::Histogram(h) => h,
            other => panic!("expected histogram, got {:?}", other.kind()),
        };
        assert_eq!(hist.count(), 500);

        let successes = match collector.get_metric(AGENT_SUCCESS_RATE).unwrap() {
            Metric::Counter(c) => c,
            other => panic!("expected counter, got {:?}", other.kind()),
        };
        assert_eq!(successes.total(), 500.0);
        assert_eq!(collector.tracer().completed_span_count(), 500);
    }

    #[test]
    fn recording_against_a_conflicting_metric_kind_fails() {
        let collector = collector();
        collector
            .registry()
            .counter(AGENT_EXECUTION_DURATION, "wrong kind", None)
            .unwrap();

        let err = collector
            .record_agent_execution("agent-a", 1.0, true, 0, None, None)
            .unwrap_err();
        assert!(matches!(err, Error::MetricTypeConflict { .. }));
    }

    #[test]
    fn failed_execution_marks_span_and_event_as_errors() {
        let collector = collector();
        collector
            .record_agent_execution("agent-a", 5.0, false, 10, Some("boom"), None)
            .unwrap();

        let spans = collector.traces(Some("agent-a"));
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, SpanStatus::Error);
        assert_eq!(spans[0].error.as_deref(), Some("boom"));

        let errors = collector.bus().events(Some(EventType::AgentError));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn llm_and_tool_recordings_feed_their_histograms() {
        let collector = collector();
        collector
            .record_llm_call("some-model", 100, 50, 230.0, Some(0.002), None)
            .unwrap();
        collector
            .record_tool_execution("search", 42.0, true, None)
            .unwrap();

        let llm = match collector.get_metric(LLM_LATENCY_MS).unwrap() {
            Metric::Histogram(h) => h,
            other => panic!("expected histogram, got {:?}", other.kind()),
        };
        assert_eq!(llm.count(), 1);
        assert_eq!(llm.values()[0].tags["model"], "some-model");

        let spans = collector.tracer().spans_by_operation("tool:search");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].attributes["duration_ms"], json!(42.0));
    }

    #[tokio::test]
    async fn export_all_isolates_failing_exporters() {
        let collector = collector();
        collector
            .record_agent_execution("agent-a", 1.0, true, 0, None, None)
            .unwrap();

        assert!(!collector.export_all().await, "no exporters means false");

        let capturing = Arc::new(CapturingExporter::new());
        collector.add_exporter(Arc::new(FailingExporter)).await;
        collector.add_exporter(Arc::clone(&capturing) as Arc<dyn Exporter>).await;

        assert!(!collector.export_all().await);

        let snapshots = capturing.snapshots.lock();
        assert_eq!(snapshots.len(), 1, "healthy exporter still ran");
        assert!(snapshots[0].contains_key(AGENT_EXECUTION_DURATION));
    }

    #[tokio::test]
    async fn remove_exporter_by_name() {
        let collector = collector();
        collector.add_exporter(Arc::new(FailingExporter)).await;
        assert!(collector.remove_exporter("failing").await);
        assert!(!collector.remove_exporter("failing").await);
    }

    #[tokio::test]
    async fn start_and_stop_complete_cleanly() {
        let collector = collector();
        collector.start();
        assert!(collector.is_running());
        collector.start();

        collector.stop().await;
        assert!(!collector.is_running());
        assert!(!collector.monitor().is_running());
    }

    #[test]
    fn cleanup_prunes_samples_history_and_spans() {
        let collector = collector();
        collector
            .record_agent_execution("agent-a", 1.0, true, 5, None, None)
            .unwrap();

        collector.set_retention(Duration::ZERO);
        collector.cleanup_old_data();

        assert!(collector.bus().is_empty());
        assert_eq!(collector.tracer().completed_span_count(), 0);
        let hist = match collector.get_metric(AGENT_EXECUTION_DURATION).unwrap() {
            Metric::Histogram(h) => h,
            other => panic!("expected histogram, got {:?}", other.kind()),
        };
        assert!(hist.values().is_empty());
        assert_eq!(hist.count(), 1);
    }

    #[test]
    fn health_status_reflects_store_sizes() {
        let collector = collector();
        collector
            .record_agent_execution("agent-a", 1.0, true, 5, None, None)
            .unwrap();

        let health = collector.health_status();
        assert!(!health.running);
        assert_eq!(health.metric_count, 3);
        assert_eq!(health.completed_spans, 1);
        assert_eq!(health.active_spans, 0);
        assert!(health.event_count >= 1);
    }
}
