//! Failure and anomaly alerting.
//!
//! Notifiers are passive observers forwarding anomalies to an
//! operator-visible channel. They must never panic and never block a pass.

use parking_lot::Mutex;
use tracing::warn;

/// Receives failure/anomaly events from the orchestrator.
pub trait AlertNotifier: Send + Sync {
    /// A pass exhausted its retries.
    fn alert_sync_failure(&self, error: &str, retry_count: u32);

    /// One response carried more conflicts than the configured threshold.
    fn alert_high_conflict_rate(&self, count: usize);

    /// Connectivity was lost.
    fn alert_network_issues(&self);
}

/// Default notifier: forwards alerts to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl AlertNotifier for TracingNotifier {
    fn alert_sync_failure(&self, error: &str, retry_count: u32) {
        warn!(error, retry_count, "sync pass failed");
    }

    fn alert_high_conflict_rate(&self, count: usize) {
        warn!(count, "high conflict rate in one sync response");
    }

    fn alert_network_issues(&self) {
        warn!("network connectivity lost");
    }
}

/// One captured alert, for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    /// Pass failure with its accumulated retry count.
    SyncFailure {
        /// The failure message.
        error: String,
        /// Retry count reported with the failure.
        retry_count: u32,
    },
    /// Conflict count above threshold.
    HighConflictRate(usize),
    /// Connectivity loss.
    NetworkIssues,
}

/// Captures alerts in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    alerts: Mutex<Vec<Alert>>,
}

impl MemoryNotifier {
    /// Creates an empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all alerts received so far.
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }
}

impl AlertNotifier for MemoryNotifier {
    fn alert_sync_failure(&self, error: &str, retry_count: u32) {
        self.alerts.lock().push(Alert::SyncFailure {
            error: error.to_string(),
            retry_count,
        });
    }

    fn alert_high_conflict_rate(&self, count: usize) {
        self.alerts.lock().push(Alert::HighConflictRate(count));
    }

    fn alert_network_issues(&self) {
        self.alerts.lock().push(Alert::NetworkIssues);
    }
}
