//! Alerting - notification queueing, deduplication, and delivery

mod notifier;
mod queue;

pub use notifier::{
    AlertHandler, AlertNotifier, EmailHandler, MultiHandler, SlackHandler, WebhookHandler,
};
pub use queue::{NotificationQueue, QueueStats};
