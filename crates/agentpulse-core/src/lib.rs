//! # AgentPulse
//!
//! Telemetry collection and tracing engine for autonomous-agent executions.
//!
//! AgentPulse records what agents do - executions, LLM calls, tool
//! invocations - as metrics, structured events, and hierarchical spans,
//! then exports and prunes them on a background schedule.
//!
//! ## Architecture
//!
//! - **Metrics**: thread-safe registry of counters, gauges, histograms,
//!   and summaries with retention-bounded sample logs
//! - **Events**: synchronous bus fanning structured events out to handlers
//! - **Tracer**: explicit-parent span tracing grouped into traces
//! - **Collector**: the recording funnel plus the export/cleanup loop
//! - **Alerting**: deduplicating notification queue with bounded retries
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use agentpulse::collector::TelemetryCollector;
//! use agentpulse::config::TelemetryConfig;
//!
//! # async fn demo() -> agentpulse::Result<()> {
//! let collector = Arc::new(TelemetryCollector::new(&TelemetryConfig::default()));
//! collector.start();
//! collector.record_agent_execution("researcher", 1250.0, true, 4200, None, None)?;
//! collector.stop().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod alerting;
pub mod collector;
pub mod config;
pub mod error;
pub mod events;
pub mod export;
pub mod metrics;
pub mod models;
pub mod tracer;

pub use config::TelemetryConfig;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{AlertNotifier, NotificationQueue};
    pub use crate::collector::TelemetryCollector;
    pub use crate::config::TelemetryConfig;
    pub use crate::error::{Error, Result};
    pub use crate::events::EventBus;
    pub use crate::export::Exporter;
    pub use crate::metrics::MetricsRegistry;
    pub use crate::models::*;
    pub use crate::tracer::AgentTracer;
}
