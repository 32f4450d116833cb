//! Configuration management for AgentPulse

use serde::{Deserialize, Serialize};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Collector configuration
    pub collector: CollectorConfig,

    /// Resource monitor configuration
    pub monitor: MonitorConfig,

    /// Notification queue configuration
    pub notifications: NotificationConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Collector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Seconds between export/cleanup passes
    pub export_interval_secs: u64,
    /// Metric sample and event retention in days
    pub retention_days: u32,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            export_interval_secs: 60,
            retention_days: 90,
        }
    }
}

/// Resource monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between system resource samples
    pub sample_interval_secs: u64,
    /// Maximum number of samples kept in memory
    pub history_limit: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: 5,
            history_limit: 1000,
        }
    }
}

/// Notification queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Delivery attempts before a notification is given up on
    pub max_retries: u32,
    /// Window in seconds during which repeated alert ids are suppressed
    pub dedup_window_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            dedup_window_secs: 300,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
