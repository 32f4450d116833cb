//! HTTP webhook exporter

use chrono::Utc;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::Event;

use super::{Exporter, MetricsSnapshot};

/// POSTs export documents as JSON to a remote endpoint
pub struct WebhookExporter {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl WebhookExporter {
    /// Create an exporter targeting `url`
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            name: "webhook".to_string(),
            url: url.into(),
            client,
        }
    }

    async fn post(&self, body: &serde_json::Value) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::export(format!("webhook request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::export(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Exporter for WebhookExporter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export(&self, metrics: &MetricsSnapshot) -> Result<()> {
        self.post(&json!({
            "timestamp": Utc::now(),
            "metrics": metrics,
        }))
        .await?;
        debug!(url = %self.url, metrics = metrics.len(), "posted metrics export");
        Ok(())
    }

    async fn export_events(&self, events: &[Event]) -> Result<()> {
        self.post(&json!({
            "timestamp": Utc::now(),
            "events": events,
        }))
        .await?;
        debug!(url = %self.url, events = events.len(), "posted events export");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Counter, Metric};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn snapshot() -> MetricsSnapshot {
        let counter = Counter::new("requests", "Total requests", None);
        counter.add(1.0);
        let mut snapshot = MetricsSnapshot::new();
        snapshot.insert("requests".into(), Metric::Counter(counter).snapshot());
        snapshot
    }

    #[tokio::test]
    async fn posts_metrics_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/telemetry"))
            .and(body_partial_json(serde_json::json!({
                "metrics": { "requests": { "total": 1.0 } }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let exporter = WebhookExporter::new(format!("{}/telemetry", server.uri()));
        exporter.export(&snapshot()).await.unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let exporter = WebhookExporter::new(server.uri());
        let err = exporter.export_events(&[]).await.unwrap_err();
        assert!(matches!(err, Error::Export(_)));
    }
}
