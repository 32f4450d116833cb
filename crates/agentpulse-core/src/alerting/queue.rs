//! Deduplicating notification queue with bounded retries

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::NotificationConfig;
use crate::models::{AlertPayload, Notification};

/// Queue counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    /// Notifications accepted since creation
    pub total_enqueued: u64,
    /// Enqueue attempts rejected by the dedup window
    pub suppressed: u64,
    /// Notifications awaiting dispatch
    pub pending: usize,
    /// Notifications currently being dispatched
    pub in_flight: usize,
    /// Notifications delivered (including given-up ones)
    pub delivered: usize,
    /// Notifications given up on after exhausting retries
    pub given_up: u64,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Notification>,
    in_flight: HashMap<Uuid, Notification>,
    delivered: Vec<Notification>,
    // alert id -> when an enqueue for it was last accepted
    accepted_at: HashMap<String, DateTime<Utc>>,
    total_enqueued: u64,
    suppressed: u64,
    given_up: u64,
}

/// FIFO notification queue
///
/// Repeated alerts inside the dedup window are suppressed; a notification
/// that fails delivery `max_retries` times is force-marked delivered so a
/// dead sink cannot wedge the queue. Operations never error; acting on an
/// unknown id returns `false`.
pub struct NotificationQueue {
    state: Mutex<QueueState>,
    dedup_window: Duration,
    max_retries: u32,
}

impl NotificationQueue {
    /// Create a queue from configuration
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            dedup_window: Duration::from_secs(config.dedup_window_secs),
            max_retries: config.max_retries,
        }
    }

    /// Enqueue a notification for an alert
    ///
    /// Returns `false` when an enqueue for the same alert id was accepted
    /// within the dedup window.
    pub fn enqueue(&self, alert: &AlertPayload) -> bool {
        let dedup_window = chrono::Duration::from_std(self.dedup_window)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        let now = Utc::now();

        let mut state = self.state.lock();
        if let Some(accepted) = state.accepted_at.get(&alert.alert_id) {
            if now - *accepted < dedup_window {
                debug!(alert_id = %alert.alert_id, "suppressed duplicate alert");
                state.suppressed += 1;
                return false;
            }
        }

        state.accepted_at.insert(alert.alert_id.clone(), now);
        state.total_enqueued += 1;
        state.pending.push_back(Notification::new(
            &alert.alert_id,
            alert.severity,
            &alert.message,
        ));
        true
    }

    /// Pop the oldest pending notification and mark it in flight
    pub fn dequeue(&self) -> Option<Notification> {
        let mut state = self.state.lock();
        let notification = state.pending.pop_front()?;
        state.in_flight.insert(notification.id, notification.clone());
        Some(notification)
    }

    /// Mark an in-flight notification delivered and reset its retry count
    pub fn mark_delivered(&self, id: Uuid) -> bool {
        let mut state = self.state.lock();
        let Some(mut notification) = state.in_flight.remove(&id) else {
            return false;
        };
        notification.delivered = true;
        notification.retry_count = 0;
        state.delivered.push(notification);
        true
    }

    /// Record a delivery failure
    ///
    /// The notification goes back to the end of the queue until it has
    /// failed `max_retries` times, at which point it is given up on and
    /// force-marked delivered.
    pub fn mark_failed(&self, id: Uuid) -> bool {
        let mut state = self.state.lock();
        let Some(mut notification) = state.in_flight.remove(&id) else {
            return false;
        };

        notification.retry_count += 1;
        if notification.retry_count >= self.max_retries {
            warn!(
                alert_id = %notification.alert_id,
                retries = notification.retry_count,
                "giving up on notification delivery"
            );
            notification.delivered = true;
            state.given_up += 1;
            state.delivered.push(notification);
        } else {
            state.pending.push_back(notification);
        }
        true
    }

    /// Copy of the pending notifications, oldest first
    pub fn pending(&self) -> Vec<Notification> {
        self.state.lock().pending.iter().cloned().collect()
    }

    /// Number of pending notifications
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    /// Drop the delivered backlog, returning how many were dropped
    pub fn clear_delivered(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.delivered.len();
        state.delivered.clear();
        count
    }

    /// Queue counters
    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            total_enqueued: state.total_enqueued,
            suppressed: state.suppressed,
            pending: state.pending.len(),
            in_flight: state.in_flight.len(),
            delivered: state.delivered.len(),
            given_up: state.given_up,
        }
    }
}
