//! Prometheus exposition-format exporter

use std::collections::BTreeMap;
use std::fmt::Write as _;

use parking_lot::Mutex;

use crate::error::Result;
use crate::metrics::MetricAggregate;
use crate::models::Event;

use super::{Exporter, MetricsSnapshot};

/// Renders metrics as Prometheus exposition text, kept in memory for a
/// scrape endpoint or a file sink to pick up via [`latest_output`]
///
/// Counters expose the lifetime total, gauges the current value,
/// histograms and summaries their lifetime sum and count. Events are
/// rendered as an `events_total{event_type,severity}` counter family.
///
/// [`latest_output`]: PrometheusExporter::latest_output
#[derive(Default)]
pub struct PrometheusExporter {
    metrics_output: Mutex<String>,
    events_output: Mutex<String>,
}

impl PrometheusExporter {
    /// Create an exporter with empty output
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent rendering: metrics section followed by the events section
    pub fn latest_output(&self) -> String {
        let mut output = self.metrics_output.lock().clone();
        output.push_str(&self.events_output.lock());
        output
    }
}

fn render_metrics(metrics: &MetricsSnapshot) -> String {
    let mut out = String::new();
    for (name, snapshot) in metrics {
        let definition = &snapshot.definition;
        let _ = writeln!(out, "# HELP {name} {}", definition.description);
        match &snapshot.aggregate {
            MetricAggregate::Total { total } => {
                let _ = writeln!(out, "# TYPE {name} counter");
                let _ = writeln!(out, "{name} {total}");
            }
            MetricAggregate::Value { value } => {
                let _ = writeln!(out, "# TYPE {name} gauge");
                let _ = writeln!(out, "{name} {value}");
            }
            MetricAggregate::Statistics { statistics } => {
                let _ = writeln!(out, "# TYPE {name} histogram");
                if let Some(stats) = statistics {
                    let _ = writeln!(out, "{name}_sum {}", stats.sum);
                    let _ = writeln!(out, "{name}_count {}", stats.count);
                }
            }
            MetricAggregate::Summary { summary } => {
                let _ = writeln!(out, "# TYPE {name} summary");
                if let Some(stats) = summary {
                    let _ = writeln!(out, "{name}_sum {}", stats.sum);
                    let _ = writeln!(out, "{name}_count {}", stats.count);
                }
            }
        }
    }
    out
}

fn render_events(events: &[Event]) -> String {
    let mut counts: BTreeMap<(String, String), u64> = BTreeMap::new();
    for event in events {
        *counts
            .entry((
                event.event_type.as_str().to_string(),
                event.severity.as_str().to_string(),
            ))
            .or_insert(0) += 1;
    }

    let mut out = String::new();
    let _ = writeln!(out, "# HELP events_total Telemetry events by type and severity");
    let _ = writeln!(out, "# TYPE events_total counter");
    for ((event_type, severity), count) in counts {
        let _ = writeln!(
            out,
            "events_total{{event_type=\"{event_type}\",severity=\"{severity}\"}} {count}"
        );
    }
    out
}

#[async_trait::async_trait]
impl Exporter for PrometheusExporter {
    fn name(&self) -> &str {
        "prometheus"
    }

    async fn export(&self, metrics: &MetricsSnapshot) -> Result<()> {
        *self.metrics_output.lock() = render_metrics(metrics);
        Ok(())
    }

    async fn export_events(&self, events: &[Event]) -> Result<()> {
        *self.events_output.lock() = render_events(events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Counter, Gauge, Histogram, Metric};
    use crate::models::EventType;

    #[tokio::test]
    async fn renders_counters_gauges_and_histograms() {
        let counter = Counter::new("requests", "Total requests", None);
        counter.add(3.0);
        let gauge = Gauge::new("depth", "Queue depth", None);
        gauge.set(7.0);
        let hist = Histogram::new("latency", "Latency", Some("ms"));
        hist.record(10.0);
        hist.record(30.0);

        let mut snapshot = MetricsSnapshot::new();
        snapshot.insert("requests".into(), Metric::Counter(counter).snapshot());
        snapshot.insert("depth".into(), Metric::Gauge(gauge).snapshot());
        snapshot.insert("latency".into(), Metric::Histogram(hist).snapshot());

        let exporter = PrometheusExporter::new();
        exporter.export(&snapshot).await.unwrap();

        let output = exporter.latest_output();
        assert!(output.contains("# TYPE requests counter"));
        assert!(output.contains("requests 3"));
        assert!(output.contains("# TYPE depth gauge"));
        assert!(output.contains("depth 7"));
        assert!(output.contains("latency_sum 40"));
        assert!(output.contains("latency_count 2"));
    }

    #[tokio::test]
    async fn renders_event_counts_with_labels() {
        let events = vec![
            Event::new(EventType::AgentStart, "agent:a", "started"),
            Event::new(EventType::AgentStart, "agent:b", "started"),
            Event::new(EventType::ToolError, "tool:search", "failed"),
        ];

        let exporter = PrometheusExporter::new();
        exporter.export_events(&events).await.unwrap();

        let output = exporter.latest_output();
        assert!(output
            .contains("events_total{event_type=\"agent.start\",severity=\"info\"} 2"));
        assert!(output
            .contains("events_total{event_type=\"tool.error\",severity=\"error\"} 1"));
    }
}
