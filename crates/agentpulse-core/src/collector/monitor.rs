//! System resource sampling
//!
//! Wraps `sysinfo` behind a sampler that runs on its own tokio task and
//! keeps a bounded in-memory history of CPU, memory, and disk readings.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::{Disks, System};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::MonitorConfig;

/// One point-in-time resource reading
#[derive(Debug, Clone, Serialize)]
pub struct SystemSample {
    /// When the sample was taken
    pub timestamp: DateTime<Utc>,
    /// CPU utilization across all cores, 0-100
    pub cpu_percent: f64,
    /// Memory utilization, 0-100
    pub memory_percent: f64,
    /// Memory in use, megabytes
    pub memory_used_mb: f64,
    /// Total physical memory, megabytes
    pub memory_total_mb: f64,
    /// Aggregate disk utilization across mounted disks, 0-100
    pub disk_percent: f64,
}

/// Min/max/average over the sample history plus the latest reading
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceStats {
    /// Most recent reading
    pub current: f64,
    /// Smallest reading in the history
    pub min: f64,
    /// Largest reading in the history
    pub max: f64,
    /// Mean over the history
    pub avg: f64,
}

/// Aggregate view over the retained sample history
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorSummary {
    /// Number of retained samples
    pub samples: usize,
    /// CPU utilization statistics
    pub cpu: ResourceStats,
    /// Memory utilization statistics
    pub memory: ResourceStats,
}

struct Probes {
    system: System,
    disks: Disks,
}

/// Periodic sysinfo-backed resource sampler with a bounded history
pub struct ResourceMonitor {
    probes: Mutex<Probes>,
    history: Mutex<VecDeque<SystemSample>>,
    history_limit: usize,
    sample_interval: Duration,
    running: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ResourceMonitor {
    /// Create a monitor; no sampling happens until [`start`](Self::start)
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            probes: Mutex::new(Probes {
                system: System::new(),
                disks: Disks::new_with_refreshed_list(),
            }),
            history: Mutex::new(VecDeque::new()),
            history_limit: config.history_limit,
            sample_interval: Duration::from_secs(config.sample_interval_secs),
            running: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// Spawn the background sampling task
    ///
    /// Idempotent; a second call while running is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.sample_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !monitor.running.load(Ordering::SeqCst) {
                    break;
                }
                let sample = monitor.current_sample();
                monitor.push_sample(sample);
            }
            debug!("resource monitor stopped");
        });
        *self.task.lock() = Some(handle);
    }

    /// Stop the sampling task
    ///
    /// The task is aborted rather than joined, cancelling a pending tick
    /// immediately; a sampler tick holds no external resources, so there is
    /// nothing to wait for.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }

    /// Whether the sampling task is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Take a reading right now, without touching the history
    pub fn current_sample(&self) -> SystemSample {
        let mut probes = self.probes.lock();
        probes.system.refresh_cpu();
        probes.system.refresh_memory();
        probes.disks.refresh();

        let cpu_percent = f64::from(probes.system.global_cpu_info().cpu_usage());

        let total = probes.system.total_memory();
        let used = probes.system.used_memory();
        let memory_percent = if total > 0 {
            (used as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        let (disk_total, disk_available) = probes
            .disks
            .iter()
            .fold((0u64, 0u64), |(total, avail), disk| {
                (total + disk.total_space(), avail + disk.available_space())
            });
        let disk_percent = if disk_total > 0 {
            ((disk_total - disk_available) as f64 / disk_total as f64) * 100.0
        } else {
            0.0
        };

        SystemSample {
            timestamp: Utc::now(),
            cpu_percent,
            memory_percent,
            memory_used_mb: used as f64 / (1024.0 * 1024.0),
            memory_total_mb: total as f64 / (1024.0 * 1024.0),
            disk_percent,
        }
    }

    /// Take a reading and append it to the history
    pub fn sample_now(&self) -> SystemSample {
        let sample = self.current_sample();
        self.push_sample(sample.clone());
        sample
    }

    fn push_sample(&self, sample: SystemSample) {
        let mut history = self.history.lock();
        history.push_back(sample);
        while history.len() > self.history_limit {
            history.pop_front();
        }
    }

    /// Most recent history entry
    pub fn latest(&self) -> Option<SystemSample> {
        self.history.lock().back().cloned()
    }

    /// Most recent `limit` history entries, oldest first
    pub fn history(&self, limit: usize) -> Vec<SystemSample> {
        let history = self.history.lock();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    /// CPU and memory statistics over the retained history
    pub fn summary(&self) -> MonitorSummary {
        let history = self.history.lock();
        if history.is_empty() {
            return MonitorSummary::default();
        }

        let cpu: Vec<f64> = history.iter().map(|s| s.cpu_percent).collect();
        let memory: Vec<f64> = history.iter().map(|s| s.memory_percent).collect();
        MonitorSummary {
            samples: history.len(),
            cpu: stats(&cpu),
            memory: stats(&memory),
        }
    }
}

fn stats(values: &[f64]) -> ResourceStats {
    let current = *values.last().unwrap_or(&0.0);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    ResourceStats {
        current,
        min,
        max,
        avg,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> ResourceMonitor {
        ResourceMonitor::new(&MonitorConfig {
            sample_interval_secs: 1,
            history_limit: 3,
        })
    }

    #[test]
    fn current_sample_reads_sane_values() {
        let monitor = monitor();
        let sample = monitor.current_sample();
        assert!(sample.cpu_percent >= 0.0);
        assert!((0.0..=100.0).contains(&sample.memory_percent));
        assert!(sample.memory_total_mb >= sample.memory_used_mb);
    }

    #[test]
    fn history_is_bounded_and_ordered() {
        let monitor = monitor();
        for _ in 0..5 {
            monitor.sample_now();
        }

        let history = monitor.history(10);
        assert_eq!(history.len(), 3);
        assert!(history[0].timestamp <= history[2].timestamp);
        assert_eq!(monitor.history(2).len(), 2);
    }

    #[test]
    fn summary_aggregates_history() {
        let monitor = monitor();
        assert_eq!(monitor.summary().samples, 0);

        monitor.sample_now();
        monitor.sample_now();
        let summary = monitor.summary();
        assert_eq!(summary.samples, 2);
        assert!(summary.cpu.min <= summary.cpu.max);
        assert!(summary.memory.avg >= summary.memory.min);
        assert!(monitor.latest().is_some());
    }

    #[tokio::test]
    async fn start_and_stop_toggle_the_running_flag() {
        let monitor = Arc::new(ResourceMonitor::new(&MonitorConfig::default()));
        monitor.start();
        assert!(monitor.is_running());
        monitor.start();

        monitor.stop();
        assert!(!monitor.is_running());
    }
}
