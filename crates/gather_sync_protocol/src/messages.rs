//! Protocol messages for one sync pass.

use crate::change::PendingChange;
use crate::ProtocolResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A server-reported disagreement for one submitted change.
///
/// Produced only as part of a [`SyncResponse`]; consumed immediately by the
/// conflict resolver and then discarded, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    /// The change the server disagreed with.
    pub change_id: Uuid,
    /// Logical entity type.
    pub table: String,
    /// Identifier of the contested entity.
    pub record_id: String,
    /// The authoritative remote entity state.
    pub server_data: Value,
    /// When the remote state was last written.
    pub server_timestamp: DateTime<Utc>,
}

/// The full batch of pending changes submitted in one sync pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// All drained pending changes, in enqueue order.
    pub changes: Vec<PendingChange>,
    /// Cursor of the last successful sync, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_timestamp: Option<DateTime<Utc>>,
}

impl SyncRequest {
    /// Creates a request carrying the given batch.
    pub fn new(changes: Vec<PendingChange>, last_sync_timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            changes,
            last_sync_timestamp,
        }
    }

    /// Returns true if the request carries no changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Encodes to JSON bytes.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes from JSON bytes.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// The server's answer to one sync pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Whether the batch was accepted.
    pub success: bool,
    /// Number of changes applied remotely.
    pub applied_changes: u64,
    /// Changes the server disagreed with.
    #[serde(default)]
    pub conflicts: Vec<SyncConflict>,
    /// Server wall-clock time; becomes the next request's cursor.
    pub server_timestamp: DateTime<Utc>,
    /// Optional human-readable detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SyncResponse {
    /// Creates a successful response with no conflicts.
    pub fn applied(applied_changes: u64) -> Self {
        Self {
            success: true,
            applied_changes,
            conflicts: Vec::new(),
            server_timestamp: Utc::now(),
            message: None,
        }
    }

    /// Creates a failed response with a message.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            applied_changes: 0,
            conflicts: Vec::new(),
            server_timestamp: Utc::now(),
            message: Some(message.into()),
        }
    }

    /// Attaches conflicts to the response.
    pub fn with_conflicts(mut self, conflicts: Vec<SyncConflict>) -> Self {
        self.conflicts = conflicts;
        self
    }

    /// Encodes to JSON bytes.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes from JSON bytes.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
