//! Mutation log store: the durable, ordered record of local changes not yet
//! confirmed by the remote authority.

use crate::error::{LogError, LogResult};
use chrono::Utc;
use gather_sync_protocol::PendingChange;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Durable, ordered store of pending changes.
///
/// Implementations must present a consistent snapshot to concurrent callers;
/// the orchestrator is the single writer during a pass.
pub trait ChangeLog: Send + Sync {
    /// Durably records a pending change.
    fn append(&self, change: PendingChange) -> LogResult<()>;

    /// Returns all unresolved changes in enqueue order.
    fn pending(&self) -> LogResult<Vec<PendingChange>>;

    /// Removes a change after successful apply or conflict resolution.
    fn mark_resolved(&self, id: Uuid) -> LogResult<()>;

    /// Increments the retry count and stores the error, keeping the change.
    fn mark_failed(&self, id: Uuid, error: &str) -> LogResult<()>;

    /// Returns the number of unresolved changes.
    fn pending_count(&self) -> LogResult<usize> {
        Ok(self.pending()?.len())
    }
}

/// An in-memory mutation log for tests and ephemeral embedding.
#[derive(Debug, Default)]
pub struct MemoryChangeLog {
    entries: RwLock<VecDeque<PendingChange>>,
}

impl MemoryChangeLog {
    /// Creates a new empty log.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChangeLog for MemoryChangeLog {
    fn append(&self, change: PendingChange) -> LogResult<()> {
        self.entries.write().push_back(change);
        Ok(())
    }

    fn pending(&self) -> LogResult<Vec<PendingChange>> {
        Ok(self.entries.read().iter().cloned().collect())
    }

    fn mark_resolved(&self, id: Uuid) -> LogResult<()> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|c| c.id != id);
        if entries.len() == before {
            return Err(LogError::UnknownChange(id));
        }
        Ok(())
    }

    fn mark_failed(&self, id: Uuid, error: &str) -> LogResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(LogError::UnknownChange(id))?;
        entry.record_failure(error);
        Ok(())
    }

    fn pending_count(&self) -> LogResult<usize> {
        Ok(self.entries.read().len())
    }
}

/// One record in the on-disk journal.
///
/// `retry_count`/`last_error` are skipped by the change's own wire codec, so
/// append records carry them explicitly; compaction would lose them otherwise.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalRecord {
    Append {
        change: PendingChange,
        #[serde(default)]
        retries: u32,
        #[serde(default)]
        last_error: Option<String>,
    },
    Resolved {
        id: Uuid,
    },
    Failed {
        id: Uuid,
        error: String,
        at: chrono::DateTime<Utc>,
    },
}

/// A file-backed mutation log.
///
/// Changes are journaled as JSON lines (`append` / `resolved` / `failed`
/// records) and flushed on every write, so the pending set survives process
/// restart. The journal is replayed on open and rewritten once dead records
/// outnumber live ones.
pub struct FileChangeLog {
    path: PathBuf,
    file: Mutex<File>,
    entries: RwLock<VecDeque<PendingChange>>,
    dead_records: Mutex<usize>,
}

// Rewrite once this many dead records accumulate past the live count.
const COMPACT_SLACK: usize = 64;

impl FileChangeLog {
    /// Opens or creates a journal at the given path, replaying its contents.
    pub fn open(path: impl AsRef<Path>) -> LogResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut entries = VecDeque::new();
        let mut dead = 0usize;

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<JournalRecord>(&line)? {
                    JournalRecord::Append {
                        mut change,
                        retries,
                        last_error,
                    } => {
                        change.retry_count = retries;
                        change.last_error = last_error;
                        entries.push_back(change);
                    }
                    JournalRecord::Resolved { id } => {
                        entries.retain(|c: &PendingChange| c.id != id);
                        dead += 2;
                    }
                    JournalRecord::Failed { id, error, .. } => {
                        if let Some(entry) = entries.iter_mut().find(|c| c.id == id) {
                            entry.record_failure(&error);
                        }
                        dead += 1;
                    }
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let log = Self {
            path,
            file: Mutex::new(file),
            entries: RwLock::new(entries),
            dead_records: Mutex::new(dead),
        };

        if dead > log.entries.read().len() + COMPACT_SLACK {
            log.compact()?;
        }

        Ok(log)
    }

    /// Returns the journal path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_record(&self, record: &JournalRecord) -> LogResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self.file.lock();
        file.write_all(&line)?;
        file.sync_data()?;
        Ok(())
    }

    /// Rewrites the journal with only live entries.
    fn compact(&self) -> LogResult<()> {
        let entries = self.entries.read();
        let tmp_path = self.path.with_extension("journal.tmp");

        {
            let mut tmp = File::create(&tmp_path)?;
            for change in entries.iter() {
                let record = JournalRecord::Append {
                    change: change.clone(),
                    retries: change.retry_count,
                    last_error: change.last_error.clone(),
                };
                let mut line = serde_json::to_vec(&record)?;
                line.push(b'\n');
                tmp.write_all(&line)?;
            }
            tmp.sync_all()?;
        }

        let mut file = self.file.lock();
        std::fs::rename(&tmp_path, &self.path)?;
        *file = OpenOptions::new().append(true).open(&self.path)?;
        *self.dead_records.lock() = 0;

        Ok(())
    }
}

impl ChangeLog for FileChangeLog {
    fn append(&self, change: PendingChange) -> LogResult<()> {
        self.write_record(&JournalRecord::Append {
            change: change.clone(),
            retries: change.retry_count,
            last_error: change.last_error.clone(),
        })?;
        self.entries.write().push_back(change);
        Ok(())
    }

    fn pending(&self) -> LogResult<Vec<PendingChange>> {
        Ok(self.entries.read().iter().cloned().collect())
    }

    fn mark_resolved(&self, id: Uuid) -> LogResult<()> {
        {
            let entries = self.entries.read();
            if !entries.iter().any(|c| c.id == id) {
                return Err(LogError::UnknownChange(id));
            }
        }

        self.write_record(&JournalRecord::Resolved { id })?;
        self.entries.write().retain(|c| c.id != id);

        let dead = {
            let mut dead = self.dead_records.lock();
            *dead += 2;
            *dead
        };
        if dead > self.entries.read().len() + COMPACT_SLACK {
            self.compact()?;
        }
        Ok(())
    }

    fn mark_failed(&self, id: Uuid, error: &str) -> LogResult<()> {
        {
            let entries = self.entries.read();
            if !entries.iter().any(|c| c.id == id) {
                return Err(LogError::UnknownChange(id));
            }
        }

        self.write_record(&JournalRecord::Failed {
            id,
            error: error.to_string(),
            at: Utc::now(),
        })?;

        let mut entries = self.entries.write();
        if let Some(entry) = entries.iter_mut().find(|c| c.id == id) {
            entry.record_failure(error);
        }
        *self.dead_records.lock() += 1;
        Ok(())
    }

    fn pending_count(&self) -> LogResult<usize> {
        Ok(self.entries.read().len())
    }
}
