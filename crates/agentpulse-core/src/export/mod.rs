//! Exporters - pluggable sinks for metric snapshots and event history
//!
//! The collector hands every registered exporter the same consistent
//! snapshot per pass; exporters are independent and one sink's failure
//! never blocks another.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::metrics::MetricSnapshot;
use crate::models::Event;

mod json;
mod prometheus;
mod webhook;

pub use json::JsonExporter;
pub use prometheus::PrometheusExporter;
pub use webhook::WebhookExporter;

/// Name-ordered snapshot of every registered metric
pub type MetricsSnapshot = BTreeMap<String, MetricSnapshot>;

/// A sink for telemetry data
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Unique exporter name, used for removal and log attribution
    fn name(&self) -> &str;

    /// Write one metrics snapshot to the sink
    async fn export(&self, metrics: &MetricsSnapshot) -> Result<()>;

    /// Write the event history to the sink
    async fn export_events(&self, events: &[Event]) -> Result<()>;
}
