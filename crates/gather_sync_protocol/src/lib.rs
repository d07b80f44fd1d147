//! # Gather Sync Protocol
//!
//! Sync protocol types and JSON wire codec for Gather.
//!
//! This crate provides:
//! - `PendingChange` for queued local mutations
//! - `SyncConflict` for server-reported disagreements
//! - Protocol messages (`SyncRequest`, `SyncResponse`)
//! - Timestamp parsing and ordering for last-writer-wins
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod messages;
mod timestamp;

pub use change::{Operation, PendingChange};
pub use messages::{SyncConflict, SyncRequest, SyncResponse};
pub use timestamp::{compare_timestamps, parse_timestamp, server_is_newer};

/// Result type for protocol encode/decode operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors produced when encoding or decoding protocol messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The message could not be serialized or deserialized.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}
