//! The sync orchestrator: retry/backoff state machine, pass triggers, and the
//! status signal observed by the UI layer.

use crate::alerts::{AlertNotifier, TracingNotifier};
use crate::auth::TokenProvider;
use crate::config::SyncConfig;
use crate::error::{LogError, SyncError, SyncResult};
use crate::log::ChangeLog;
use crate::metrics::{SyncMetrics, SyncStats};
use crate::network::NetworkMonitor;
use crate::resolver::{ConflictResolver, MergeRegistry};
use crate::store::EntityStore;
use crate::transport::SyncTransport;
use chrono::{DateTime, Utc};
use gather_sync_protocol::{Operation, PendingChange, SyncRequest};
use parking_lot::{Condvar, Mutex, RwLock};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Sync state observed by the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// No pass in flight.
    Idle,
    /// A pass is draining the mutation log.
    Syncing,
    /// The last pass exhausted its retries.
    Error(String),
}

/// Outcome of one completed sync pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// Changes the server confirmed applied.
    pub applied_changes: u64,
    /// Conflicts resolved locally during the pass.
    pub conflicts_resolved: u64,
    /// Wall-clock duration of the pass including retries.
    pub duration: Duration,
    /// Optional server-provided detail.
    pub server_message: Option<String>,
}

impl SyncReport {
    fn empty() -> Self {
        Self {
            applied_changes: 0,
            conflicts_resolved: 0,
            duration: Duration::ZERO,
            server_message: None,
        }
    }
}

/// Events delivered to the background worker.
enum EngineEvent {
    Connectivity(bool),
    LocalChange,
    Shutdown,
}

/// Interruptible sleep used for backoff and shutdown.
#[derive(Default)]
struct ShutdownSignal {
    signalled: Mutex<bool>,
    condvar: Condvar,
}

impl ShutdownSignal {
    fn signal(&self) {
        *self.signalled.lock() = true;
        self.condvar.notify_all();
    }

    fn is_signalled(&self) -> bool {
        *self.signalled.lock()
    }

    /// Sleeps up to `duration`; returns true if shutdown arrived first.
    fn sleep(&self, duration: Duration) -> bool {
        let mut signalled = self.signalled.lock();
        if *signalled {
            return true;
        }
        self.condvar.wait_for(&mut signalled, duration);
        *signalled
    }
}

/// Owns the sync state machine.
///
/// One orchestrator exists per device. Passes are serialized by an internal
/// pass lock: background triggers (connectivity edges, local changes, the
/// periodic sweep) `try_lock` and silently drop when a pass is in flight,
/// while [`SyncOrchestrator::trigger_sync`] waits its turn, so two concurrent
/// triggers never produce overlapping transport calls.
///
/// All background work runs on a single owned worker thread; `shutdown()`
/// stops and joins it. Nothing is detached.
pub struct SyncOrchestrator<T: SyncTransport, S: EntityStore> {
    config: SyncConfig,
    transport: T,
    log: Arc<dyn ChangeLog>,
    resolver: ConflictResolver<S>,
    tokens: Arc<dyn TokenProvider>,
    notifier: Arc<dyn AlertNotifier>,
    network: Arc<NetworkMonitor>,
    metrics: SyncMetrics,
    status: watch::Sender<SyncStatus>,
    pass_lock: Mutex<()>,
    last_sync: RwLock<Option<DateTime<Utc>>>,
    consecutive_failures: AtomicU32,
    shutdown: ShutdownSignal,
    events_tx: mpsc::Sender<EngineEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<EngineEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T, S> SyncOrchestrator<T, S>
where
    T: SyncTransport + 'static,
    S: EntityStore + 'static,
{
    /// Creates an orchestrator with the default merge registry and the
    /// tracing alert notifier.
    pub fn new(
        config: SyncConfig,
        transport: T,
        log: Arc<dyn ChangeLog>,
        store: Arc<S>,
        tokens: Arc<dyn TokenProvider>,
        network: Arc<NetworkMonitor>,
    ) -> Self {
        Self::with_parts(
            config,
            transport,
            log,
            ConflictResolver::new(store),
            tokens,
            Arc::new(TracingNotifier),
            network,
        )
    }

    /// Creates an orchestrator from explicit parts.
    pub fn with_parts(
        config: SyncConfig,
        transport: T,
        log: Arc<dyn ChangeLog>,
        resolver: ConflictResolver<S>,
        tokens: Arc<dyn TokenProvider>,
        notifier: Arc<dyn AlertNotifier>,
        network: Arc<NetworkMonitor>,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);
        let (events_tx, events_rx) = mpsc::channel();

        Self {
            config,
            transport,
            log,
            resolver,
            tokens,
            notifier,
            network,
            metrics: SyncMetrics::new(),
            status,
            pass_lock: Mutex::new(()),
            last_sync: RwLock::new(None),
            consecutive_failures: AtomicU32::new(0),
            shutdown: ShutdownSignal::default(),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            worker: Mutex::new(None),
        }
    }

    /// Replaces the merge registry, rebuilding the resolver.
    pub fn set_merge_registry(&mut self, registry: MergeRegistry) {
        self.resolver.set_registry(registry);
    }

    /// Spawns the background worker (connectivity edges + periodic sweep).
    ///
    /// Idempotent: a second call is a no-op. The worker holds only a weak
    /// handle between ticks, so dropping the last external handle also stops
    /// it; `shutdown()` stops it promptly and joins.
    pub fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }

        let Some(events_rx) = self.events_rx.lock().take() else {
            return;
        };

        let edge_tx = self.events_tx.clone();
        self.network.register_listener(move |online| {
            let _ = edge_tx.send(EngineEvent::Connectivity(online));
        });

        let this = Arc::downgrade(self);
        *worker = Some(std::thread::spawn(move || loop {
            let Some(orchestrator) = this.upgrade() else {
                break;
            };
            if !orchestrator.worker_tick(&events_rx) {
                break;
            }
        }));
        info!("sync worker started");
    }

    /// Stops the background worker, interrupting any backoff sleep, and
    /// joins it. Changes mid-backoff stay pending for the next trigger.
    pub fn shutdown(&self) {
        self.stop_worker();
        info!("sync worker stopped");
    }

    /// Records a local mutation into the mutation log.
    ///
    /// If the device is online, a background pass is triggered; the caller
    /// never waits on the network.
    pub fn record_local_change(
        &self,
        table: impl Into<String>,
        operation: Operation,
        record_id: impl Into<String>,
        payload: Value,
        author_id: impl Into<String>,
    ) -> SyncResult<()> {
        let change = PendingChange::new(table, operation, record_id, payload, author_id);
        debug!(change_id = %change.id, table = %change.table, "local change recorded");
        self.log.append(change)?;

        if self.network.is_online() {
            let _ = self.events_tx.send(EngineEvent::LocalChange);
        }
        Ok(())
    }

    /// Returns true if unresolved changes remain in the mutation log.
    pub fn has_pending_changes(&self) -> bool {
        self.log.pending_count().map(|n| n > 0).unwrap_or(false)
    }

    /// Runs a sync pass now, waiting for any in-flight pass to finish first.
    pub fn trigger_sync(&self) -> SyncResult<SyncReport> {
        let _guard = self.pass_lock.lock();
        self.run_pass()
    }

    /// Returns the current status.
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Returns a read-only status stream for the UI layer.
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Returns a snapshot of the cumulative sync metrics.
    pub fn metrics(&self) -> SyncStats {
        self.metrics.stats()
    }

    /// Background pass attempt: drops silently if a pass is in flight.
    fn try_pass(&self, origin: &str) {
        let Some(_guard) = self.pass_lock.try_lock() else {
            debug!(origin, "pass already in flight, trigger dropped");
            return;
        };
        match self.run_pass() {
            Ok(report) => {
                debug!(origin, applied = report.applied_changes, "background pass done");
            }
            Err(err) => {
                debug!(origin, %err, "background pass failed");
            }
        }
    }

    /// One complete sync pass, including in-pass retries.
    ///
    /// Caller must hold the pass lock.
    fn run_pass(&self) -> SyncResult<SyncReport> {
        // Guards: fail fast, consume no retries, mark nothing failed.
        if !self.network.is_online() {
            return Err(SyncError::Offline);
        }
        let token = self.tokens.current_token().ok_or(SyncError::NoAuthToken)?;

        let batch = self.log.pending()?;
        if batch.is_empty() {
            // Trivial success: no network call, no status flicker.
            return Ok(SyncReport::empty());
        }

        self.set_status(SyncStatus::Syncing);
        self.metrics.record_sync_start();
        let start = Instant::now();

        let request = SyncRequest::new(batch.clone(), *self.last_sync.read());
        info!(changes = batch.len(), "sync pass started");

        let mut last_error = SyncError::Protocol("no attempts made".into());

        for attempt in 0..self.config.retry.max_attempts {
            if attempt > 0 {
                let delay = self.config.retry.delay_for_attempt(attempt);
                debug!(attempt, ?delay, "backing off before retry");
                if self.shutdown.sleep(delay) {
                    // Cancelled mid-backoff: changes stay pending, unmarked.
                    self.set_status(SyncStatus::Idle);
                    return Err(SyncError::Cancelled);
                }
            }

            match self.transport.send(&request, &token) {
                Ok(response) if response.success => {
                    // A local failure while resolving (log or store) still
                    // ends the pass through the failure path so the status
                    // channel never sticks on Syncing.
                    return match self.finish_success(&batch, response, start) {
                        Ok(report) => Ok(report),
                        Err(err) => self.finish_failure(&batch, err, start),
                    };
                }
                Ok(response) => {
                    let message = response
                        .message
                        .unwrap_or_else(|| "server rejected the batch".into());
                    warn!(attempt, %message, "server rejected sync batch");
                    last_error = SyncError::Server(message);
                }
                Err(err @ SyncError::Forbidden(_)) => {
                    // Terminal for this batch: alert at once, no further retries.
                    self.notifier.alert_sync_failure(&err.to_string(), attempt);
                    last_error = err;
                    break;
                }
                Err(err @ SyncError::Unauthorized(_)) => {
                    // Never blindly retried; the token provider is consulted
                    // fresh on the next trigger.
                    last_error = err;
                    break;
                }
                Err(err) if err.is_retryable() => {
                    warn!(attempt, %err, "sync attempt failed");
                    last_error = err;
                }
                Err(err) => {
                    last_error = err;
                    break;
                }
            }
        }

        self.finish_failure(&batch, last_error, start)
    }

    fn finish_success(
        &self,
        batch: &[PendingChange],
        response: gather_sync_protocol::SyncResponse,
        start: Instant,
    ) -> SyncResult<SyncReport> {
        let mut conflicted: HashSet<uuid::Uuid> = HashSet::new();
        let conflict_count = response.conflicts.len();

        for conflict in &response.conflicts {
            // Write-back happens inside resolve(), before the log entry is
            // dropped; a crash in between leaves the change pending and the
            // merge durable.
            let resolution = self.resolver.resolve(conflict)?;
            self.metrics
                .record_conflict_resolved(&resolution.table, resolution.strategy);
            conflicted.insert(conflict.change_id);
            self.mark_resolved_lenient(conflict.change_id)?;
        }

        for change in batch {
            if !conflicted.contains(&change.id) {
                self.mark_resolved_lenient(change.id)?;
            }
        }

        *self.last_sync.write() = Some(response.server_timestamp);
        self.consecutive_failures.store(0, Ordering::SeqCst);

        let duration = start.elapsed();
        self.metrics
            .record_sync_success(duration, response.applied_changes);
        self.warn_if_slow(duration);

        if conflict_count > self.config.conflict_alert_threshold {
            self.notifier.alert_high_conflict_rate(conflict_count);
        }

        self.set_status(SyncStatus::Idle);
        info!(
            applied = response.applied_changes,
            conflicts = conflict_count,
            ?duration,
            "sync pass succeeded"
        );

        Ok(SyncReport {
            applied_changes: response.applied_changes,
            conflicts_resolved: conflict_count as u64,
            duration,
            server_message: response.message,
        })
    }

    fn finish_failure(
        &self,
        batch: &[PendingChange],
        error: SyncError,
        start: Instant,
    ) -> SyncResult<SyncReport> {
        let message = error.to_string();

        for change in batch {
            match self.log.mark_failed(change.id, &message) {
                // Changes resolved before a mid-pass failure are already gone.
                Ok(()) | Err(LogError::UnknownChange(_)) => {}
                Err(err) => {
                    warn!(change_id = %change.id, %err, "failed to record change failure");
                }
            }
        }

        let duration = start.elapsed();
        self.metrics.record_sync_failure(duration, &message);
        self.warn_if_slow(duration);

        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures > 1 {
            self.notifier.alert_sync_failure(&message, failures);
        }

        self.set_status(SyncStatus::Error(message.clone()));
        warn!(%message, failures, ?duration, "sync pass exhausted retries");

        Err(error)
    }

    /// Marks a change resolved, tolerating ids the log no longer holds
    /// (e.g. a conflict re-reported for an already-compacted change).
    fn mark_resolved_lenient(&self, id: uuid::Uuid) -> SyncResult<()> {
        match self.log.mark_resolved(id) {
            Ok(()) => Ok(()),
            Err(LogError::UnknownChange(id)) => {
                debug!(change_id = %id, "resolved change was not in the log");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn warn_if_slow(&self, duration: Duration) {
        if duration > self.config.slow_pass_threshold {
            warn!(
                ?duration,
                threshold = ?self.config.slow_pass_threshold,
                "sync pass exceeded slow-pass threshold"
            );
        }
    }

    fn set_status(&self, status: SyncStatus) {
        let _ = self.status.send_replace(status);
    }

    /// One worker iteration: waits for an event or the sweep timeout and
    /// reacts. Returns false once the worker should exit.
    fn worker_tick(&self, events: &mpsc::Receiver<EngineEvent>) -> bool {
        if self.shutdown.is_signalled() {
            return false;
        }

        match events.recv_timeout(self.config.sweep_interval) {
            Ok(EngineEvent::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => false,
            Ok(EngineEvent::Connectivity(true)) => {
                if self.has_pending_changes() {
                    info!("connectivity restored, draining mutation log");
                    self.try_pass("connectivity");
                }
                true
            }
            Ok(EngineEvent::Connectivity(false)) => {
                self.notifier.alert_network_issues();
                true
            }
            Ok(EngineEvent::LocalChange) => {
                self.try_pass("local-change");
                true
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if self.sweep_due() {
                    debug!("periodic sweep re-triggering failed changes");
                    self.try_pass("sweep");
                }
                true
            }
        }
    }

    /// The sweep re-triggers only while some previously failed change is
    /// still below the retry ceiling. Exhausted changes stay in the log with
    /// `last_error` set and ride along on explicit triggers.
    fn sweep_due(&self) -> bool {
        if !self.network.is_online() {
            return false;
        }
        match self.log.pending() {
            Ok(pending) => pending.iter().any(|c| {
                c.last_error.is_some() && !c.is_exhausted(self.config.retry.max_attempts)
            }),
            Err(err) => {
                warn!(%err, "sweep could not read the mutation log");
                false
            }
        }
    }
}

impl<T: SyncTransport, S: EntityStore> SyncOrchestrator<T, S> {
    fn stop_worker(&self) {
        self.shutdown.signal();
        let _ = self.events_tx.send(EngineEvent::Shutdown);

        if let Some(handle) = self.worker.lock().take() {
            // When the worker's own tick drops the last handle, this runs on
            // the worker thread and must not join itself.
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl<T: SyncTransport, S: EntityStore> Drop for SyncOrchestrator<T, S> {
    fn drop(&mut self) {
        self.stop_worker();
    }
}
