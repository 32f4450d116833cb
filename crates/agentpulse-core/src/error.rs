//! Error types for AgentPulse

use thiserror::Error;

use crate::models::MetricKind;

/// Result type alias using AgentPulse's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for AgentPulse operations
#[derive(Error, Debug)]
pub enum Error {
    /// A metric name is already bound to a different kind
    #[error("metric '{name}' is registered as {existing}, cannot redefine as {requested}")]
    MetricTypeConflict {
        /// Name of the conflicting metric
        name: String,
        /// Kind the metric was originally registered with
        existing: MetricKind,
        /// Kind the caller asked for
        requested: MetricKind,
    },

    /// A metric with this name is already registered
    #[error("metric '{0}' already registered")]
    AlreadyRegistered(String),

    /// Not found error
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity type (handler, exporter, ...)
        entity: String,
        /// Identifier that was looked up
        id: String,
    },

    /// Export failure reported by an exporter
    #[error("export error: {0}")]
    Export(String),

    /// Notification delivery failure
    #[error("notification error: {0}")]
    Notification(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create an export error
    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }

    /// Create a notification error
    pub fn notification(msg: impl Into<String>) -> Self {
        Self::Notification(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
