//! # Gather Sync Engine
//!
//! Offline-first sync engine for Gather.
//!
//! This crate provides:
//! - Durable mutation log for queued local changes
//! - Sync orchestrator with retry and exponential backoff
//! - Last-writer-wins conflict resolution with set-union merging
//! - HTTP transport abstraction
//! - Sync metrics and failure alerting
//!
//! ## Architecture
//!
//! The engine implements a **push-with-conflicts** synchronization model:
//! 1. Local mutations are appended to the mutation log and applied locally
//!    at once (the UI never waits on the network)
//! 2. A sync pass drains the whole log into one batch and submits it
//! 3. The server reports conflicts for changes it disagreed with; the
//!    resolver merges each one and writes the result back to local storage
//!
//! ## Key Invariants
//!
//! - Changes leave the log only as resolved or failed, never silently
//! - At most one sync pass runs at a time
//! - Guard failures (offline, no token) consume no retries
//! - Merges are never subtractive on set-union fields

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod alerts;
mod auth;
mod config;
mod error;
mod http;
mod log;
mod metrics;
mod network;
mod orchestrator;
mod resolver;
mod store;
mod transport;

pub use alerts::{Alert, AlertNotifier, MemoryNotifier, TracingNotifier};
pub use auth::{StaticTokenProvider, TokenProvider};
pub use config::{RetryConfig, SyncConfig};
pub use error::{LogError, LogResult, SyncError, SyncResult};
pub use http::{HttpClient, HttpReply, HttpTransport};
pub use log::{ChangeLog, FileChangeLog, MemoryChangeLog};
pub use metrics::{SyncMetrics, SyncStats};
pub use network::NetworkMonitor;
pub use orchestrator::{SyncOrchestrator, SyncReport, SyncStatus};
pub use resolver::{
    default_registry, ConflictResolver, LocalWins, LwwMerge, MergeOutcome, MergeRegistry,
    MergeStrategy, Resolution,
};
pub use store::{EntityStore, MemoryEntityStore};
pub use transport::{MockTransport, SyncTransport};
