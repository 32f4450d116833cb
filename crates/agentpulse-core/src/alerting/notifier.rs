//! Notification delivery for alerts

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{AlertSeverity, Notification};

use super::queue::NotificationQueue;

/// A delivery channel for alert notifications
#[async_trait]
pub trait AlertHandler: Send + Sync {
    /// Channel name, used for log attribution
    fn name(&self) -> &str;

    /// Deliver one notification
    async fn send(&self, notification: &Notification) -> Result<()>;
}

fn severity_color(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Info => "#0099FF",
        AlertSeverity::Warning => "#FF9900",
        AlertSeverity::Error => "#FF0000",
        AlertSeverity::Critical => "#8B0000",
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_default()
}

// Slack payload types
#[derive(Debug, Serialize)]
struct SlackPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    color: String,
    title: String,
    text: String,
    fields: Vec<SlackField>,
    ts: i64,
}

#[derive(Debug, Serialize)]
struct SlackField {
    title: String,
    value: String,
    short: bool,
}

/// Delivers notifications to a Slack incoming webhook
pub struct SlackHandler {
    webhook_url: String,
    channel: Option<String>,
    client: reqwest::Client,
}

impl SlackHandler {
    /// Create a handler posting to `webhook_url`
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            channel: None,
            client: http_client(),
        }
    }

    /// Override the webhook's default channel
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }
}

#[async_trait]
impl AlertHandler for SlackHandler {
    fn name(&self) -> &str {
        "slack"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let payload = SlackPayload {
            channel: self.channel.clone(),
            username: Some("AgentPulse".to_string()),
            attachments: vec![SlackAttachment {
                color: severity_color(notification.severity).to_string(),
                title: format!("Alert: {}", notification.alert_id),
                text: notification.message.clone(),
                fields: vec![
                    SlackField {
                        title: "Severity".to_string(),
                        value: notification.severity.as_str().to_string(),
                        short: true,
                    },
                    SlackField {
                        title: "Retries".to_string(),
                        value: notification.retry_count.to_string(),
                        short: true,
                    },
                ],
                ts: notification.enqueued_at.timestamp(),
            }],
        };

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::notification(format!("Slack request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::notification(format!(
                "Slack returned {}",
                response.status()
            )));
        }

        info!(alert_id = %notification.alert_id, "Slack notification sent");
        Ok(())
    }
}

/// POSTs notifications as JSON to an arbitrary endpoint
pub struct WebhookHandler {
    url: String,
    client: reqwest::Client,
}

impl WebhookHandler {
    /// Create a handler posting to `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: http_client(),
        }
    }
}

#[async_trait]
impl AlertHandler for WebhookHandler {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| Error::notification(format!("webhook request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::notification(format!(
                "webhook returned {}",
                response.status()
            )));
        }

        info!(alert_id = %notification.alert_id, url = %self.url, "webhook notification sent");
        Ok(())
    }
}

/// Email delivery placeholder; logs the intent until SMTP is configured
pub struct EmailHandler {
    recipients: Vec<String>,
}

impl EmailHandler {
    /// Create a handler addressed to `recipients`
    pub fn new(recipients: Vec<String>) -> Self {
        Self { recipients }
    }
}

#[async_trait]
impl AlertHandler for EmailHandler {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        warn!(
            alert_id = %notification.alert_id,
            recipients = ?self.recipients,
            "email notifications not yet implemented"
        );
        Ok(())
    }
}

/// Fans one notification out to several handlers; succeeds only if all do
pub struct MultiHandler {
    name: String,
    handlers: Vec<Arc<dyn AlertHandler>>,
}

impl MultiHandler {
    /// Create a fan-out handler
    pub fn new(name: impl Into<String>, handlers: Vec<Arc<dyn AlertHandler>>) -> Self {
        Self {
            name: name.into(),
            handlers,
        }
    }
}

#[async_trait]
impl AlertHandler for MultiHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        for handler in &self.handlers {
            handler.send(notification).await?;
        }
        Ok(())
    }
}

/// Drives the notification queue through a set of delivery channels
///
/// A notification counts as delivered only when every handler accepted it;
/// any failure sends it back through the queue's retry accounting.
pub struct AlertNotifier {
    queue: Arc<NotificationQueue>,
    handlers: Vec<Arc<dyn AlertHandler>>,
}

impl AlertNotifier {
    /// Create a notifier over `queue` with no channels
    pub fn new(queue: Arc<NotificationQueue>) -> Self {
        Self {
            queue,
            handlers: Vec::new(),
        }
    }

    /// Add a delivery channel
    pub fn add_handler(&mut self, handler: Arc<dyn AlertHandler>) {
        self.handlers.push(handler);
    }

    /// The queue this notifier drives
    pub fn queue(&self) -> &Arc<NotificationQueue> {
        &self.queue
    }

    /// Dispatch every pending notification once; returns how many delivered
    ///
    /// A failed notification is requeued but not retried within the same
    /// pass, so one call makes at most one attempt per notification.
    pub async fn dispatch_pending(&self) -> usize {
        if self.handlers.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        for _ in 0..self.queue.len() {
            let Some(notification) = self.queue.dequeue() else {
                break;
            };

            let mut all_ok = true;
            for handler in &self.handlers {
                if let Err(e) = handler.send(&notification).await {
                    warn!(
                        handler = handler.name(),
                        alert_id = %notification.alert_id,
                        error = %e,
                        "notification delivery failed"
                    );
                    all_ok = false;
                }
            }

            if all_ok {
                self.queue.mark_delivered(notification.id);
                delivered += 1;
            } else {
                debug!(alert_id = %notification.alert_id, "notification requeued");
                self.queue.mark_failed(notification.id);
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationConfig;
    use crate::models::AlertPayload;
    use chrono::Utc;
    use parking_lot::Mutex;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct RecordingHandler {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingHandler {
        fn new(fail: bool) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl AlertHandler for RecordingHandler {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, notification: &Notification) -> Result<()> {
            self.sent.lock().push(notification.alert_id.clone());
            if self.fail {
                return Err(Error::notification("channel down"));
            }
            Ok(())
        }
    }

    fn alert(id: &str) -> AlertPayload {
        AlertPayload {
            alert_id: id.to_string(),
            rule_id: "rule-1".to_string(),
            timestamp: Utc::now(),
            severity: AlertSeverity::Critical,
            message: "memory above threshold".to_string(),
            acknowledged: false,
        }
    }

    fn queue() -> Arc<NotificationQueue> {
        Arc::new(NotificationQueue::new(&NotificationConfig::default()))
    }

    #[tokio::test]
    async fn slack_handler_posts_severity_colored_attachment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "attachments": [{ "color": "#8B0000" }]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let handler = SlackHandler::new(format!("{}/hook", server.uri()));
        let notification = Notification::new("high-memory", AlertSeverity::Critical, "memory");
        handler.send(&notification).await.unwrap();
    }

    #[tokio::test]
    async fn webhook_handler_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let handler = WebhookHandler::new(server.uri());
        let notification = Notification::new("high-cpu", AlertSeverity::Warning, "cpu");
        let err = handler.send(&notification).await.unwrap_err();
        assert!(matches!(err, Error::Notification(_)));
    }

    #[tokio::test]
    async fn dispatch_delivers_when_every_handler_succeeds() {
        let queue = queue();
        queue.enqueue(&alert("high-cpu"));
        queue.enqueue(&alert("high-memory"));

        let recording = Arc::new(RecordingHandler::new(false));
        let mut notifier = AlertNotifier::new(Arc::clone(&queue));
        notifier.add_handler(Arc::clone(&recording) as Arc<dyn AlertHandler>);

        assert_eq!(notifier.dispatch_pending().await, 2);
        assert!(queue.is_empty());
        assert_eq!(queue.stats().delivered, 2);
        assert_eq!(*recording.sent.lock(), vec!["high-cpu", "high-memory"]);
    }

    #[tokio::test]
    async fn dispatch_requeues_on_any_handler_failure() {
        let queue = queue();
        queue.enqueue(&alert("high-cpu"));

        let healthy = Arc::new(RecordingHandler::new(false));
        let failing = Arc::new(RecordingHandler::new(true));
        let mut notifier = AlertNotifier::new(Arc::clone(&queue));
        notifier.add_handler(Arc::clone(&healthy) as Arc<dyn AlertHandler>);
        notifier.add_handler(failing as Arc<dyn AlertHandler>);

        assert_eq!(notifier.dispatch_pending().await, 0);
        // Requeued with one failed attempt on the books.
        let pending = queue.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retry_count, 1);
        assert_eq!(healthy.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn dispatch_without_handlers_never_marks_delivered() {
        let queue = queue();
        queue.enqueue(&alert("high-cpu"));
        let notifier = AlertNotifier::new(Arc::clone(&queue));

        assert_eq!(notifier.dispatch_pending().await, 0);
        assert_eq!(queue.stats().delivered, 0);
    }
}
