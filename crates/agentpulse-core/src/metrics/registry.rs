//! Named metric store with get-or-create semantics

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::models::MetricKind;

use super::variants::{
    Counter, Gauge, Histogram, Metric, MetricOverview, MetricSnapshot, Summary,
};

/// Thread-safe name → metric store
///
/// The registry lock guards structural changes only; each metric carries its
/// own lock for recording. Snapshot reads copy the mapping before releasing
/// the lock so serialization never blocks producers.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    metrics: RwLock<HashMap<String, Metric>>,
}

impl MetricsRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an externally constructed metric
    pub fn register(&self, metric: Metric) -> Result<()> {
        let mut metrics = self.metrics.write();
        let name = metric.definition().name.clone();
        if metrics.contains_key(&name) {
            return Err(Error::AlreadyRegistered(name));
        }
        metrics.insert(name, metric);
        Ok(())
    }

    /// Look up a metric by name
    pub fn get(&self, name: &str) -> Option<Metric> {
        self.metrics.read().get(name).cloned()
    }

    /// Get or create a counter
    ///
    /// Idempotent for an existing counter of the same name; fails with
    /// [`Error::MetricTypeConflict`] if the name is bound to another kind.
    pub fn counter(&self, name: &str, description: &str, unit: Option<&str>) -> Result<Counter> {
        let mut metrics = self.metrics.write();
        match metrics.get(name) {
            Some(Metric::Counter(counter)) => Ok(counter.clone()),
            Some(other) => Err(conflict(name, other, MetricKind::Counter)),
            None => {
                let counter = Counter::new(name, description, unit);
                metrics.insert(name.to_string(), Metric::Counter(counter.clone()));
                Ok(counter)
            }
        }
    }

    /// Get or create a gauge
    pub fn gauge(&self, name: &str, description: &str, unit: Option<&str>) -> Result<Gauge> {
        let mut metrics = self.metrics.write();
        match metrics.get(name) {
            Some(Metric::Gauge(gauge)) => Ok(gauge.clone()),
            Some(other) => Err(conflict(name, other, MetricKind::Gauge)),
            None => {
                let gauge = Gauge::new(name, description, unit);
                metrics.insert(name.to_string(), Metric::Gauge(gauge.clone()));
                Ok(gauge)
            }
        }
    }

    /// Get or create a histogram; `buckets` applies only on first creation
    pub fn histogram(
        &self,
        name: &str,
        description: &str,
        unit: Option<&str>,
        buckets: Option<Vec<f64>>,
    ) -> Result<Histogram> {
        let mut metrics = self.metrics.write();
        match metrics.get(name) {
            Some(Metric::Histogram(histogram)) => Ok(histogram.clone()),
            Some(other) => Err(conflict(name, other, MetricKind::Histogram)),
            None => {
                let histogram = match buckets {
                    Some(buckets) => Histogram::with_buckets(name, description, unit, buckets),
                    None => Histogram::new(name, description, unit),
                };
                metrics.insert(name.to_string(), Metric::Histogram(histogram.clone()));
                Ok(histogram)
            }
        }
    }

    /// Get or create a summary
    pub fn summary(&self, name: &str, description: &str, unit: Option<&str>) -> Result<Summary> {
        let mut metrics = self.metrics.write();
        match metrics.get(name) {
            Some(Metric::Summary(summary)) => Ok(summary.clone()),
            Some(other) => Err(conflict(name, other, MetricKind::Summary)),
            None => {
                let summary = Summary::new(name, description, unit);
                metrics.insert(name.to_string(), Metric::Summary(summary.clone()));
                Ok(summary)
            }
        }
    }

    /// Copy of the name → metric mapping
    pub fn snapshot(&self) -> HashMap<String, Metric> {
        self.metrics.read().clone()
    }

    /// Export snapshot of every metric, in name order
    ///
    /// The registry lock is released before the per-metric snapshots are
    /// taken, so producers are never blocked by serialization.
    pub fn export_snapshot(&self) -> BTreeMap<String, MetricSnapshot> {
        let metrics = self.snapshot();
        metrics
            .into_iter()
            .map(|(name, metric)| (name, metric.snapshot()))
            .collect()
    }

    /// Lightweight overview of every metric
    pub fn overview(&self) -> BTreeMap<String, MetricOverview> {
        let metrics = self.snapshot();
        metrics
            .into_iter()
            .map(|(name, metric)| (name, metric.overview()))
            .collect()
    }

    /// Number of registered metrics
    pub fn len(&self) -> usize {
        self.metrics.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.metrics.read().is_empty()
    }

    /// Drop samples older than `now - retention` from every metric
    ///
    /// The mapping is copied under the registry lock, then each metric is
    /// pruned under its own lock.
    pub fn cleanup_old_values(&self, retention: Duration) {
        let metrics: Vec<Metric> = self.metrics.read().values().cloned().collect();
        for metric in metrics {
            metric.cleanup_old_values(retention);
        }
    }
}

fn conflict(name: &str, existing: &Metric, requested: MetricKind) -> Error {
    Error::MetricTypeConflict {
        name: name.to_string(),
        existing: existing.kind(),
        requested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn get_or_create_is_idempotent() {
        let registry = MetricsRegistry::new();
        let first = registry.counter("requests", "Total requests", None).unwrap();
        first.add(4.0);

        let second = registry.counter("requests", "Total requests", None).unwrap();
        assert_eq!(second.total(), 4.0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn redefining_kind_is_a_type_conflict() {
        let registry = MetricsRegistry::new();
        registry.counter("requests", "Total requests", None).unwrap();

        let err = registry
            .gauge("requests", "Requests as gauge", None)
            .unwrap_err();
        match err {
            Error::MetricTypeConflict {
                name,
                existing,
                requested,
            } => {
                assert_eq!(name, "requests");
                assert_eq!(existing, MetricKind::Counter);
                assert_eq!(requested, MetricKind::Gauge);
            }
            other => panic!("expected type conflict, got {other}"),
        }
    }

    #[test]
    fn register_rejects_duplicate_names() {
        let registry = MetricsRegistry::new();
        registry
            .register(Metric::Gauge(Gauge::new("depth", "Queue depth", None)))
            .unwrap();
        let err = registry
            .register(Metric::Gauge(Gauge::new("depth", "Queue depth", None)))
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyRegistered(_)));
    }

    #[test]
    fn concurrent_get_or_create_yields_one_metric() {
        let registry = Arc::new(MetricsRegistry::new());
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let hist = registry
                            .histogram("latency", "Latency", Some("ms"), None)
                            .unwrap();
                        hist.record(1.0);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(registry.len(), 1);
        let hist = registry
            .histogram("latency", "Latency", Some("ms"), None)
            .unwrap();
        assert_eq!(hist.count(), 400);
    }

    #[test]
    fn cleanup_empties_samples_but_keeps_aggregates() {
        let registry = MetricsRegistry::new();
        let counter = registry.counter("total", "Total", None).unwrap();
        let hist = registry.histogram("dist", "Dist", None, None).unwrap();
        counter.add(9.0);
        hist.record(3.0);

        registry.cleanup_old_values(Duration::ZERO);

        assert!(counter.values().is_empty());
        assert!(hist.values().is_empty());
        assert_eq!(counter.total(), 9.0);
        assert_eq!(hist.sum(), 3.0);
    }
}
