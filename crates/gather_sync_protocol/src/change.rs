//! Pending changes queued for synchronization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The kind of local mutation a change represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// A new entity was created locally.
    Create,
    /// An existing entity was modified locally.
    Update,
    /// An entity was deleted locally.
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "CREATE"),
            Operation::Update => write!(f, "UPDATE"),
            Operation::Delete => write!(f, "DELETE"),
        }
    }
}

/// A queued local mutation awaiting confirmation by the remote authority.
///
/// The payload is a full serialized snapshot of the entity's local state at
/// enqueue time, not a diff. Later entries for the same entity supersede
/// earlier ones logically via timestamp comparison during merge, so enqueue
/// never deduplicates.
///
/// # Lifecycle
///
/// - Created on any local mutation while offline or unconfirmed
/// - `retry_count`/`last_error` mutated on failed sync attempts
/// - Removed once the remote confirms the apply or its conflict was resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    /// Unique change ID, generated at enqueue time.
    pub id: Uuid,
    /// Logical entity type (e.g. "events", "participants", "votes").
    pub table: String,
    /// Kind of mutation.
    pub operation: Operation,
    /// Identifier of the affected entity.
    pub record_id: String,
    /// Serialized snapshot of the entity's local state at enqueue time.
    #[serde(rename = "data")]
    pub payload: Value,
    /// Local wall-clock time at enqueue.
    pub timestamp: DateTime<Utc>,
    /// User who made the change.
    #[serde(rename = "userId")]
    pub author_id: String,
    /// Number of failed sync attempts. Never decremented.
    #[serde(default, skip_serializing)]
    pub retry_count: u32,
    /// Most recent failure message, cleared on success.
    #[serde(default, skip_serializing)]
    pub last_error: Option<String>,
}

impl PendingChange {
    /// Creates a new pending change timestamped now, with a fresh ID.
    pub fn new(
        table: impl Into<String>,
        operation: Operation,
        record_id: impl Into<String>,
        payload: Value,
        author_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            table: table.into(),
            operation,
            record_id: record_id.into(),
            payload,
            timestamp: Utc::now(),
            author_id: author_id.into(),
            retry_count: 0,
            last_error: None,
        }
    }

    /// Records a failed sync attempt.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.retry_count += 1;
        self.last_error = Some(error.into());
    }

    /// Returns true if this change has exhausted the given retry ceiling.
    pub fn is_exhausted(&self, max_attempts: u32) -> bool {
        self.retry_count >= max_attempts
    }
}
