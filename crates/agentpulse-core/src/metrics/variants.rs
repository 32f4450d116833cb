//! Metric variants: counter, gauge, histogram, summary
//!
//! Each variant keeps an ordered, time-ascending sample log plus
//! kind-specific aggregate state behind one lock. Aggregates (totals, sums,
//! counts) cover the metric's whole lifetime; the sample log is a bounded
//! recent window pruned by retention, so trimming never changes a counter
//! total or a histogram sum.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::models::{MetricDefinition, MetricKind, MetricValue, TagMap};

/// Default histogram bucket boundaries, in seconds
///
/// Stored for export metadata; percentile statistics are computed from raw
/// retained samples by nearest rank, not from buckets.
pub(crate) const DEFAULT_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

fn retention_cutoff(retention: Duration) -> DateTime<Utc> {
    let retention =
        chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::days(36_500));
    Utc::now() - retention
}

fn prune(values: &mut Vec<MetricValue>, cutoff: DateTime<Utc>) {
    values.retain(|v| v.timestamp > cutoff);
}

/// Nearest-rank percentile: value at index `floor(n * pct / 100)` of the
/// sorted samples, clamped to the last index. No interpolation.
fn nearest_rank(sorted: &[f64], pct: f64) -> f64 {
    let idx = (sorted.len() as f64 * pct / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Monotonically increasing total with a sample log of increments
#[derive(Debug, Clone)]
pub struct Counter {
    inner: Arc<CounterInner>,
}

#[derive(Debug)]
struct CounterInner {
    definition: MetricDefinition,
    state: Mutex<CounterState>,
}

#[derive(Debug, Default)]
struct CounterState {
    total: f64,
    values: Vec<MetricValue>,
}

impl Counter {
    /// Create a counter metric
    pub fn new(name: impl Into<String>, description: impl Into<String>, unit: Option<&str>) -> Self {
        let mut definition = MetricDefinition::new(name, MetricKind::Counter, description);
        definition.unit = unit.map(str::to_string);
        Self {
            inner: Arc::new(CounterInner {
                definition,
                state: Mutex::new(CounterState::default()),
            }),
        }
    }

    /// Definition of this counter
    pub fn definition(&self) -> &MetricDefinition {
        &self.inner.definition
    }

    /// Add 1 to the running total
    pub fn increment(&self) {
        self.add(1.0);
    }

    /// Add an amount to the running total and append a sample of the delta
    pub fn add(&self, amount: f64) {
        self.add_with_tags(amount, TagMap::new());
    }

    /// Like [`Counter::add`], with per-sample tags
    pub fn add_with_tags(&self, amount: f64, tags: TagMap) {
        let mut state = self.inner.state.lock();
        state.total += amount;
        state.values.push(MetricValue::new(amount, tags));
    }

    /// Lifetime total, independent of sample trimming
    pub fn total(&self) -> f64 {
        self.inner.state.lock().total
    }

    /// Copy of the retained sample log
    pub fn values(&self) -> Vec<MetricValue> {
        self.inner.state.lock().values.clone()
    }

    /// Drop samples older than `now - retention`; the total is untouched
    pub fn cleanup_old_values(&self, retention: Duration) {
        let cutoff = retention_cutoff(retention);
        prune(&mut self.inner.state.lock().values, cutoff);
    }

    fn snapshot(&self) -> MetricSnapshot {
        let state = self.inner.state.lock();
        MetricSnapshot {
            definition: self.inner.definition.clone(),
            values: state.values.clone(),
            aggregate: MetricAggregate::Total { total: state.total },
        }
    }
}

/// Point-in-time value; every mutation appends a sample so the value history
/// is reconstructible
#[derive(Debug, Clone)]
pub struct Gauge {
    inner: Arc<GaugeInner>,
}

#[derive(Debug)]
struct GaugeInner {
    definition: MetricDefinition,
    state: Mutex<GaugeState>,
}

#[derive(Debug, Default)]
struct GaugeState {
    current: f64,
    values: Vec<MetricValue>,
}

impl Gauge {
    /// Create a gauge metric
    pub fn new(name: impl Into<String>, description: impl Into<String>, unit: Option<&str>) -> Self {
        let mut definition = MetricDefinition::new(name, MetricKind::Gauge, description);
        definition.unit = unit.map(str::to_string);
        Self {
            inner: Arc::new(GaugeInner {
                definition,
                state: Mutex::new(GaugeState::default()),
            }),
        }
    }

    /// Definition of this gauge
    pub fn definition(&self) -> &MetricDefinition {
        &self.inner.definition
    }

    /// Replace the current value
    pub fn set(&self, value: f64) {
        self.set_with_tags(value, TagMap::new());
    }

    /// Like [`Gauge::set`], with per-sample tags
    pub fn set_with_tags(&self, value: f64, tags: TagMap) {
        let mut state = self.inner.state.lock();
        state.current = value;
        state.values.push(MetricValue::new(value, tags));
    }

    /// Add a delta to the current value
    pub fn increment_by(&self, amount: f64) {
        let mut state = self.inner.state.lock();
        state.current += amount;
        let current = state.current;
        state.values.push(MetricValue::new(current, TagMap::new()));
    }

    /// Subtract a delta from the current value
    pub fn decrement_by(&self, amount: f64) {
        self.increment_by(-amount);
    }

    /// Current value
    pub fn value(&self) -> f64 {
        self.inner.state.lock().current
    }

    /// Copy of the retained sample log
    pub fn values(&self) -> Vec<MetricValue> {
        self.inner.state.lock().values.clone()
    }

    /// Drop samples older than `now - retention`; the current value is untouched
    pub fn cleanup_old_values(&self, retention: Duration) {
        let cutoff = retention_cutoff(retention);
        prune(&mut self.inner.state.lock().values, cutoff);
    }

    fn snapshot(&self) -> MetricSnapshot {
        let state = self.inner.state.lock();
        MetricSnapshot {
            definition: self.inner.definition.clone(),
            values: state.values.clone(),
            aggregate: MetricAggregate::Value { value: state.current },
        }
    }
}

/// Distribution with O(1) lifetime sum/count and nearest-rank percentiles
/// over the retained sample window
#[derive(Debug, Clone)]
pub struct Histogram {
    inner: Arc<HistogramInner>,
}

#[derive(Debug)]
struct HistogramInner {
    definition: MetricDefinition,
    buckets: Vec<f64>,
    state: Mutex<HistogramState>,
}

#[derive(Debug, Default)]
struct HistogramState {
    sum: f64,
    count: u64,
    values: Vec<MetricValue>,
}

impl Histogram {
    /// Create a histogram metric with the default bucket boundaries
    pub fn new(name: impl Into<String>, description: impl Into<String>, unit: Option<&str>) -> Self {
        Self::with_buckets(name, description, unit, DEFAULT_BUCKETS.to_vec())
    }

    /// Create a histogram metric with explicit bucket boundaries
    pub fn with_buckets(
        name: impl Into<String>,
        description: impl Into<String>,
        unit: Option<&str>,
        buckets: Vec<f64>,
    ) -> Self {
        let mut definition = MetricDefinition::new(name, MetricKind::Histogram, description);
        definition.unit = unit.map(str::to_string);
        Self {
            inner: Arc::new(HistogramInner {
                definition,
                buckets,
                state: Mutex::new(HistogramState::default()),
            }),
        }
    }

    /// Definition of this histogram
    pub fn definition(&self) -> &MetricDefinition {
        &self.inner.definition
    }

    /// Configured bucket boundaries
    pub fn buckets(&self) -> &[f64] {
        &self.inner.buckets
    }

    /// Record an observation
    pub fn record(&self, value: f64) {
        self.record_with_tags(value, TagMap::new());
    }

    /// Like [`Histogram::record`], with per-sample tags
    pub fn record_with_tags(&self, value: f64, tags: TagMap) {
        let mut state = self.inner.state.lock();
        state.sum += value;
        state.count += 1;
        state.values.push(MetricValue::new(value, tags));
    }

    /// Lifetime sum of all recorded values
    pub fn sum(&self) -> f64 {
        self.inner.state.lock().sum
    }

    /// Lifetime observation count
    pub fn count(&self) -> u64 {
        self.inner.state.lock().count
    }

    /// Distribution statistics, or None when no samples are retained
    ///
    /// Count, sum and mean cover the metric's lifetime; min, max, median and
    /// the percentiles are computed over the retained window only.
    pub fn statistics(&self) -> Option<HistogramStatistics> {
        compute_statistics(&self.inner.state.lock())
    }

    /// Copy of the retained sample log
    pub fn values(&self) -> Vec<MetricValue> {
        self.inner.state.lock().values.clone()
    }

    /// Drop samples older than `now - retention`; sum and count are untouched
    pub fn cleanup_old_values(&self, retention: Duration) {
        let cutoff = retention_cutoff(retention);
        prune(&mut self.inner.state.lock().values, cutoff);
    }

    fn snapshot(&self) -> MetricSnapshot {
        let state = self.inner.state.lock();
        MetricSnapshot {
            definition: self.inner.definition.clone(),
            values: state.values.clone(),
            aggregate: MetricAggregate::Statistics {
                statistics: compute_statistics(&state),
            },
        }
    }
}

fn compute_statistics(state: &HistogramState) -> Option<HistogramStatistics> {
    if state.values.is_empty() {
        return None;
    }

    let mut sorted: Vec<f64> = state.values.iter().map(|v| v.value).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    Some(HistogramStatistics {
        count: state.count,
        sum: state.sum,
        mean: if state.count > 0 {
            state.sum / state.count as f64
        } else {
            0.0
        },
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        median: median(&sorted),
        p50: nearest_rank(&sorted, 50.0),
        p90: nearest_rank(&sorted, 90.0),
        p95: nearest_rank(&sorted, 95.0),
        p99: nearest_rank(&sorted, 99.0),
    })
}

/// Distribution with lifetime sum/count and min/max, no percentiles
#[derive(Debug, Clone)]
pub struct Summary {
    inner: Arc<SummaryInner>,
}

#[derive(Debug)]
struct SummaryInner {
    definition: MetricDefinition,
    state: Mutex<SummaryState>,
}

#[derive(Debug, Default)]
struct SummaryState {
    sum: f64,
    count: u64,
    values: Vec<MetricValue>,
}

impl Summary {
    /// Create a summary metric
    pub fn new(name: impl Into<String>, description: impl Into<String>, unit: Option<&str>) -> Self {
        let mut definition = MetricDefinition::new(name, MetricKind::Summary, description);
        definition.unit = unit.map(str::to_string);
        Self {
            inner: Arc::new(SummaryInner {
                definition,
                state: Mutex::new(SummaryState::default()),
            }),
        }
    }

    /// Definition of this summary
    pub fn definition(&self) -> &MetricDefinition {
        &self.inner.definition
    }

    /// Record an observation
    pub fn record(&self, value: f64) {
        self.record_with_tags(value, TagMap::new());
    }

    /// Like [`Summary::record`], with per-sample tags
    pub fn record_with_tags(&self, value: f64, tags: TagMap) {
        let mut state = self.inner.state.lock();
        state.sum += value;
        state.count += 1;
        state.values.push(MetricValue::new(value, tags));
    }

    /// Lifetime sum of all recorded values
    pub fn sum(&self) -> f64 {
        self.inner.state.lock().sum
    }

    /// Lifetime observation count
    pub fn count(&self) -> u64 {
        self.inner.state.lock().count
    }

    /// Summary statistics, or None when no samples are retained
    ///
    /// Count, sum and mean cover the lifetime; min/max cover the retained
    /// window.
    pub fn summary(&self) -> Option<SummaryStatistics> {
        compute_summary(&self.inner.state.lock())
    }

    /// Copy of the retained sample log
    pub fn values(&self) -> Vec<MetricValue> {
        self.inner.state.lock().values.clone()
    }

    /// Drop samples older than `now - retention`; sum and count are untouched
    pub fn cleanup_old_values(&self, retention: Duration) {
        let cutoff = retention_cutoff(retention);
        prune(&mut self.inner.state.lock().values, cutoff);
    }

    fn snapshot(&self) -> MetricSnapshot {
        let state = self.inner.state.lock();
        MetricSnapshot {
            definition: self.inner.definition.clone(),
            values: state.values.clone(),
            aggregate: MetricAggregate::Summary {
                summary: compute_summary(&state),
            },
        }
    }
}

fn compute_summary(state: &SummaryState) -> Option<SummaryStatistics> {
    if state.values.is_empty() {
        return None;
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in &state.values {
        min = min.min(v.value);
        max = max.max(v.value);
    }

    Some(SummaryStatistics {
        count: state.count,
        sum: state.sum,
        mean: if state.count > 0 {
            state.sum / state.count as f64
        } else {
            0.0
        },
        min,
        max,
    })
}

/// A metric of any kind
///
/// Clones share the underlying state, so a handle pulled from the registry
/// observes all subsequent recordings.
#[derive(Debug, Clone)]
pub enum Metric {
    /// Counter variant
    Counter(Counter),
    /// Gauge variant
    Gauge(Gauge),
    /// Histogram variant
    Histogram(Histogram),
    /// Summary variant
    Summary(Summary),
}

impl Metric {
    /// Definition of the metric
    pub fn definition(&self) -> &MetricDefinition {
        match self {
            Self::Counter(m) => m.definition(),
            Self::Gauge(m) => m.definition(),
            Self::Histogram(m) => m.definition(),
            Self::Summary(m) => m.definition(),
        }
    }

    /// Kind of the metric
    pub fn kind(&self) -> MetricKind {
        self.definition().kind
    }

    /// Record a value with the kind-appropriate semantics: counters add,
    /// gauges set, histograms and summaries observe
    pub fn record(&self, value: f64) {
        self.record_with_tags(value, TagMap::new());
    }

    /// Like [`Metric::record`], with per-sample tags
    pub fn record_with_tags(&self, value: f64, tags: TagMap) {
        match self {
            Self::Counter(m) => m.add_with_tags(value, tags),
            Self::Gauge(m) => m.set_with_tags(value, tags),
            Self::Histogram(m) => m.record_with_tags(value, tags),
            Self::Summary(m) => m.record_with_tags(value, tags),
        }
    }

    /// Copy of the retained sample log
    pub fn values(&self) -> Vec<MetricValue> {
        match self {
            Self::Counter(m) => m.values(),
            Self::Gauge(m) => m.values(),
            Self::Histogram(m) => m.values(),
            Self::Summary(m) => m.values(),
        }
    }

    /// Number of retained samples
    pub fn sample_count(&self) -> usize {
        match self {
            Self::Counter(m) => m.inner.state.lock().values.len(),
            Self::Gauge(m) => m.inner.state.lock().values.len(),
            Self::Histogram(m) => m.inner.state.lock().values.len(),
            Self::Summary(m) => m.inner.state.lock().values.len(),
        }
    }

    /// Drop samples older than `now - retention`; aggregates are untouched
    pub fn cleanup_old_values(&self, retention: Duration) {
        match self {
            Self::Counter(m) => m.cleanup_old_values(retention),
            Self::Gauge(m) => m.cleanup_old_values(retention),
            Self::Histogram(m) => m.cleanup_old_values(retention),
            Self::Summary(m) => m.cleanup_old_values(retention),
        }
    }

    /// Consistent export snapshot of definition, samples and aggregate state
    pub fn snapshot(&self) -> MetricSnapshot {
        match self {
            Self::Counter(m) => m.snapshot(),
            Self::Gauge(m) => m.snapshot(),
            Self::Histogram(m) => m.snapshot(),
            Self::Summary(m) => m.snapshot(),
        }
    }

    /// Lightweight description for summaries and health reports
    pub fn overview(&self) -> MetricOverview {
        MetricOverview {
            definition: self.definition().clone(),
            values_count: self.sample_count(),
        }
    }
}

/// Export shape of one metric: definition, retained samples and the
/// kind-specific aggregate
#[derive(Debug, Clone, Serialize)]
pub struct MetricSnapshot {
    /// Definition of the metric
    pub definition: MetricDefinition,
    /// Retained samples at snapshot time
    pub values: Vec<MetricValue>,
    /// Kind-specific aggregate state
    #[serde(flatten)]
    pub aggregate: MetricAggregate,
}

/// Kind-specific aggregate carried in a [`MetricSnapshot`]
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MetricAggregate {
    /// Counter lifetime total
    Total {
        /// Running total
        total: f64,
    },
    /// Gauge current value
    Value {
        /// Current value
        value: f64,
    },
    /// Histogram statistics
    Statistics {
        /// Distribution statistics, absent when no samples are retained
        statistics: Option<HistogramStatistics>,
    },
    /// Summary statistics
    Summary {
        /// Summary statistics, absent when no samples are retained
        summary: Option<SummaryStatistics>,
    },
}

/// Distribution statistics for a histogram
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramStatistics {
    /// Lifetime observation count
    pub count: u64,
    /// Lifetime sum
    pub sum: f64,
    /// Lifetime mean
    pub mean: f64,
    /// Minimum of the retained window
    pub min: f64,
    /// Maximum of the retained window
    pub max: f64,
    /// Median of the retained window
    pub median: f64,
    /// 50th percentile (nearest rank)
    pub p50: f64,
    /// 90th percentile (nearest rank)
    pub p90: f64,
    /// 95th percentile (nearest rank)
    pub p95: f64,
    /// 99th percentile (nearest rank)
    pub p99: f64,
}

/// Summary statistics for a summary metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStatistics {
    /// Lifetime observation count
    pub count: u64,
    /// Lifetime sum
    pub sum: f64,
    /// Lifetime mean
    pub mean: f64,
    /// Minimum of the retained window
    pub min: f64,
    /// Maximum of the retained window
    pub max: f64,
}

/// Lightweight metric description: definition plus retained sample count
#[derive(Debug, Clone, Serialize)]
pub struct MetricOverview {
    /// Definition of the metric
    pub definition: MetricDefinition,
    /// Number of retained samples
    pub values_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::thread;

    #[test]
    fn counter_total_survives_retention_trim() {
        let counter = Counter::new("requests", "Total requests", None);
        counter.add(5.0);
        counter.add(7.0);
        assert_eq!(counter.total(), 12.0);
        assert_eq!(counter.values().len(), 2);

        counter.cleanup_old_values(Duration::ZERO);
        assert!(counter.values().is_empty());
        assert_eq!(counter.total(), 12.0);
    }

    #[test]
    fn concurrent_increments_sum_exactly() {
        let counter = Counter::new("hits", "Concurrent hits", None);
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.increment();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(counter.total(), 8000.0);
        assert_eq!(counter.values().len(), 8000);
    }

    #[test]
    fn gauge_history_is_reconstructible() {
        let gauge = Gauge::new("depth", "Queue depth", None);
        gauge.set(10.0);
        gauge.increment_by(5.0);
        gauge.decrement_by(3.0);
        assert_eq!(gauge.value(), 12.0);

        let history: Vec<f64> = gauge.values().iter().map(|v| v.value).collect();
        assert_eq!(history, vec![10.0, 15.0, 12.0]);
    }

    #[test]
    fn histogram_percentiles_use_nearest_rank() {
        let hist = Histogram::new("latency", "Latency", Some("ms"));
        for v in 1..=100 {
            hist.record(f64::from(v));
        }

        let stats = hist.statistics().unwrap();
        assert_eq!(stats.count, 100);
        assert_eq!(stats.sum, 5050.0);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 100.0);
        // floor(100 * p / 100) indexes into the sorted samples
        assert_eq!(stats.p50, 51.0);
        assert_eq!(stats.p90, 91.0);
        assert_eq!(stats.p95, 96.0);
        assert_eq!(stats.p99, 100.0);
    }

    #[test]
    fn histogram_percentile_index_clamps_to_last() {
        let hist = Histogram::new("single", "One sample", None);
        hist.record(42.0);
        let stats = hist.statistics().unwrap();
        assert_eq!(stats.p99, 42.0);
        assert_eq!(stats.median, 42.0);
    }

    #[test]
    fn histogram_sum_and_count_survive_retention_trim() {
        let hist = Histogram::new("latency", "Latency", Some("ms"));
        hist.record(10.0);
        hist.record(20.0);

        hist.cleanup_old_values(Duration::ZERO);
        assert!(hist.values().is_empty());
        assert_eq!(hist.sum(), 30.0);
        assert_eq!(hist.count(), 2);
        // No retained samples means no window statistics
        assert!(hist.statistics().is_none());
    }

    #[test]
    fn summary_tracks_window_min_max() {
        let summary = Summary::new("tokens", "Token usage", None);
        summary.record(10.0);
        summary.record(2.0);
        summary.record(30.0);

        let stats = summary.summary().unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.sum, 42.0);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 30.0);
    }

    #[test]
    fn snapshot_carries_kind_specific_aggregate() {
        let counter = Counter::new("c", "Counter", None);
        counter.add(3.0);
        let json = serde_json::to_value(Metric::Counter(counter).snapshot()).unwrap();
        assert_eq!(json["total"], serde_json::json!(3.0));
        assert_eq!(json["definition"]["type"], serde_json::json!("counter"));
        assert_eq!(json["values"].as_array().unwrap().len(), 1);
    }
}
