//! JSON file exporter

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::error::Result;
use crate::models::Event;

use super::{Exporter, MetricsSnapshot};

/// Writes one timestamped JSON document per export pass
///
/// Metrics land in `metrics_<UTC timestamp>.json`, events in
/// `events_<UTC timestamp>.json`, both under the configured directory.
pub struct JsonExporter {
    name: String,
    dir: PathBuf,
}

impl JsonExporter {
    /// Create an exporter writing into `dir`, creating it if needed
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            name: "json".to_string(),
            dir,
        })
    }

    /// Directory the exporter writes into
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, prefix: &str) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        self.dir.join(format!("{prefix}_{stamp}.json"))
    }
}

#[async_trait::async_trait]
impl Exporter for JsonExporter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export(&self, metrics: &MetricsSnapshot) -> Result<()> {
        let document = json!({
            "timestamp": Utc::now(),
            "metrics": metrics,
        });
        let path = self.file_path("metrics");
        tokio::fs::write(&path, serde_json::to_vec_pretty(&document)?).await?;
        debug!(path = %path.display(), metrics = metrics.len(), "wrote metrics export");
        Ok(())
    }

    async fn export_events(&self, events: &[Event]) -> Result<()> {
        let document = json!({
            "timestamp": Utc::now(),
            "events": events,
        });
        let path = self.file_path("events");
        tokio::fs::write(&path, serde_json::to_vec_pretty(&document)?).await?;
        debug!(path = %path.display(), events = events.len(), "wrote events export");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Counter, Metric};
    use crate::models::EventType;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn snapshot_with_counter() -> MetricsSnapshot {
        let counter = Counter::new("requests", "Total requests", None);
        counter.add(2.0);
        let mut snapshot = BTreeMap::new();
        snapshot.insert("requests".to_string(), Metric::Counter(counter).snapshot());
        snapshot
    }

    #[tokio::test]
    async fn export_writes_timestamped_metrics_document() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = JsonExporter::new(dir.path()).unwrap();

        exporter.export(&snapshot_with_counter()).await.unwrap();

        let entry = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap();
        let filename = entry.file_name().into_string().unwrap();
        assert!(filename.starts_with("metrics_"));
        assert!(filename.ends_with(".json"));

        let document: serde_json::Value =
            serde_json::from_slice(&std::fs::read(entry.path()).unwrap()).unwrap();
        assert!(document["timestamp"].is_string());
        assert_eq!(document["metrics"]["requests"]["total"], json!(2.0));
        assert_eq!(
            document["metrics"]["requests"]["definition"]["type"],
            json!("counter")
        );
    }

    #[tokio::test]
    async fn export_events_writes_history_document() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = JsonExporter::new(dir.path()).unwrap();

        let events = vec![Event::new(EventType::AgentStart, "agent:a", "started")];
        exporter.export_events(&events).await.unwrap();

        let entry = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap();
        assert!(entry.file_name().into_string().unwrap().starts_with("events_"));

        let document: serde_json::Value =
            serde_json::from_slice(&std::fs::read(entry.path()).unwrap()).unwrap();
        let events = document["events"].as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["event_type"], json!("agent.start"));
    }
}
