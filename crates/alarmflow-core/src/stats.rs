//! Propagation statistics.
//!
//! DASUs report every propagation to a [`StatsSink`]; the default
//! [`LoggingStats`] accumulates counters that the owning process logs
//! periodically (the supervisor drives the period). Statistics never
//! influence evaluation: losing them is harmless.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;

/// Receiver of DASU propagation reports.
pub trait StatsSink: Send + Sync {
    /// One propagation completed, with its wall-clock duration and how
    /// many buffered inputs it consumed.
    fn propagation(&self, duration_ms: u64, inputs_processed: usize);

    /// One output was actually published.
    fn published(&self);
}

/// A sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStats;

impl StatsSink for NullStats {
    fn propagation(&self, _duration_ms: u64, _inputs_processed: usize) {}
    fn published(&self) {}
}

/// Counting sink whose snapshot is logged periodically.
#[derive(Debug, Default)]
pub struct LoggingStats {
    propagations: AtomicU64,
    inputs_processed: AtomicU64,
    propagation_time_ms: AtomicU64,
    publishes: AtomicU64,
}

/// One period's worth of counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Propagations run in the period.
    pub propagations: u64,
    /// Inputs consumed in the period.
    pub inputs_processed: u64,
    /// Total propagation time in the period, milliseconds.
    pub propagation_time_ms: u64,
    /// Outputs published in the period.
    pub publishes: u64,
}

impl LoggingStats {
    /// A fresh sink with zeroed counters.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Takes and resets the counters.
    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        StatsSnapshot {
            propagations: self.propagations.swap(0, Ordering::Relaxed),
            inputs_processed: self.inputs_processed.swap(0, Ordering::Relaxed),
            propagation_time_ms: self.propagation_time_ms.swap(0, Ordering::Relaxed),
            publishes: self.publishes.swap(0, Ordering::Relaxed),
        }
    }

    /// Logs and resets the counters; called by the owning process at
    /// the configured statistics period.
    pub fn log_summary(&self, scope: &str) {
        let snap = self.snapshot_and_reset();
        info!(
            scope,
            propagations = snap.propagations,
            inputs = snap.inputs_processed,
            propagation_time_ms = snap.propagation_time_ms,
            publishes = snap.publishes,
            "propagation statistics"
        );
    }
}

impl StatsSink for LoggingStats {
    fn propagation(&self, duration_ms: u64, inputs_processed: usize) {
        self.propagations.fetch_add(1, Ordering::Relaxed);
        self.propagation_time_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
        self.inputs_processed
            .fetch_add(inputs_processed as u64, Ordering::Relaxed);
    }

    fn published(&self) {
        self.publishes.fetch_add(1, Ordering::Relaxed);
    }
}
