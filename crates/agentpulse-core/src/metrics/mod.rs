//! Thread-safe metric store
//!
//! Metric variants are cheaply cloneable handles sharing state behind a
//! per-metric lock; the [`MetricsRegistry`] guards structural changes
//! (creation) with its own lock and hands out get-or-create handles.

mod registry;
mod variants;

pub use registry::MetricsRegistry;
pub use variants::{
    Counter, Gauge, Histogram, HistogramStatistics, Metric, MetricAggregate, MetricOverview,
    MetricSnapshot, Summary, SummaryStatistics,
};
