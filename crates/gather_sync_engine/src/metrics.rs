//! Sync metrics collection.
//!
//! Passive sink: recording never fails and never blocks a pass.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;
use tracing::debug;

/// Cumulative sync statistics.
///
/// Counters are monotonic except `average_duration`, which is recomputed from
/// the running total on every snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStats {
    /// Total sync passes attempted.
    pub attempts: u64,
    /// Passes that completed successfully.
    pub successes: u64,
    /// Passes that exhausted their retries.
    pub failures: u64,
    /// Mean pass duration across all completed passes.
    pub average_duration: Duration,
    /// Total changes confirmed applied by the server.
    pub changes_applied: u64,
    /// Conflicts resolved locally.
    pub conflicts_resolved: u64,
    /// Wall-clock time of the last successful pass.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Most recent pass failure message.
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    stats: SyncStats,
    total_duration: Duration,
    completed: u64,
}

/// Collects counts and durations for observability.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    inner: RwLock<Inner>,
}

impl SyncMetrics {
    /// Creates a fresh collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the start of a sync pass.
    pub fn record_sync_start(&self) {
        self.inner.write().stats.attempts += 1;
    }

    /// Records a successful pass.
    pub fn record_sync_success(&self, duration: Duration, applied: u64) {
        let mut inner = self.inner.write();
        inner.stats.successes += 1;
        inner.stats.changes_applied += applied;
        inner.stats.last_sync_time = Some(Utc::now());
        inner.stats.last_error = None;
        inner.total_duration += duration;
        inner.completed += 1;
    }

    /// Records a failed pass.
    pub fn record_sync_failure(&self, duration: Duration, error: &str) {
        let mut inner = self.inner.write();
        inner.stats.failures += 1;
        inner.stats.last_error = Some(error.to_string());
        inner.total_duration += duration;
        inner.completed += 1;
    }

    /// Records one resolved conflict.
    pub fn record_conflict_resolved(&self, table: &str, strategy: &str) {
        debug!(table, strategy, "conflict resolution recorded");
        self.inner.write().stats.conflicts_resolved += 1;
    }

    /// Returns a snapshot of the cumulative stats.
    pub fn stats(&self) -> SyncStats {
        let inner = self.inner.read();
        let mut stats = inner.stats.clone();
        if inner.completed > 0 {
            let completed = u32::try_from(inner.completed).unwrap_or(u32::MAX);
            stats.average_duration = inner.total_duration / completed;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_collector_is_zeroed() {
        let metrics = SyncMetrics::new();
        let stats = metrics.stats();
        assert_eq!(stats.attempts, 0);
        assert_eq!(stats.average_duration, Duration::ZERO);
        assert!(stats.last_sync_time.is_none());
    }

    #[test]
    fn success_updates_counters() {
        let metrics = SyncMetrics::new();
        metrics.record_sync_start();
        metrics.record_sync_success(Duration::from_millis(200), 3);

        let stats = metrics.stats();
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.changes_applied, 3);
        assert!(stats.last_sync_time.is_some());
        assert!(stats.last_error.is_none());
    }

    #[test]
    fn failure_keeps_error_until_next_success() {
        let metrics = SyncMetrics::new();
        metrics.record_sync_start();
        metrics.record_sync_failure(Duration::from_millis(100), "timeout");

        assert_eq!(metrics.stats().failures, 1);
        assert_eq!(metrics.stats().last_error.as_deref(), Some("timeout"));

        metrics.record_sync_start();
        metrics.record_sync_success(Duration::from_millis(100), 1);
        assert!(metrics.stats().last_error.is_none());
    }

    #[test]
    fn average_duration_recomputed() {
        let metrics = SyncMetrics::new();
        metrics.record_sync_success(Duration::from_millis(100), 0);
        metrics.record_sync_failure(Duration::from_millis(300), "x");

        assert_eq!(metrics.stats().average_duration, Duration::from_millis(200));
    }

    #[test]
    fn conflicts_accumulate() {
        let metrics = SyncMetrics::new();
        metrics.record_conflict_resolved("events", "lww");
        metrics.record_conflict_resolved("comments", "lww");
        assert_eq!(metrics.stats().conflicts_resolved, 2);
    }
}
