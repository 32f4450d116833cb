//! Metric definition and sample records

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Key/value tags attached to definitions and samples
pub type TagMap = HashMap<String, String>;

/// Kind of metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Monotonically increasing total
    Counter,
    /// Point-in-time value that can go up and down
    Gauge,
    /// Distribution of observed values with percentile statistics
    Histogram,
    /// Distribution of observed values without percentiles
    Summary,
}

impl MetricKind {
    /// Lowercase wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
            Self::Summary => "summary",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable descriptor of a named metric
///
/// A name is permanently bound to one kind; attempting to re-register it
/// under a different kind fails with [`crate::Error::MetricTypeConflict`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Unique metric name
    pub name: String,

    /// Kind of metric
    #[serde(rename = "type")]
    pub kind: MetricKind,

    /// Human-readable description
    pub description: String,

    /// Unit of the recorded values (e.g. "ms")
    pub unit: Option<String>,

    /// Static tags attached to the definition
    #[serde(default, skip_serializing_if = "TagMap::is_empty")]
    pub tags: TagMap,
}

impl MetricDefinition {
    /// Create a new definition without unit or tags
    pub fn new(name: impl Into<String>, kind: MetricKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            unit: None,
            tags: TagMap::new(),
        }
    }

    /// Set the unit
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Attach a static tag
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// A single recorded sample
///
/// Samples are appended, never mutated, and are subject to retention-based
/// deletion. Aggregate state (counter totals, histogram sums) lives on the
/// owning metric and survives retention trimming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricValue {
    /// Recorded value
    pub value: f64,

    /// When the sample was recorded
    pub timestamp: DateTime<Utc>,

    /// Per-sample tags
    #[serde(default, skip_serializing_if = "TagMap::is_empty")]
    pub tags: TagMap,
}

impl MetricValue {
    /// Create a sample timestamped now
    pub fn new(value: f64, tags: TagMap) -> Self {
        Self {
            value,
            timestamp: Utc::now(),
            tags,
        }
    }
}
