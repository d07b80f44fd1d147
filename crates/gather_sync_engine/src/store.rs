//! Local entity storage interface.
//!
//! The engine does not own a persistence layer; it consumes the app's
//! repositories through this trait to read the local side of a conflict and
//! to write merged entities back.

use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

/// Entity accessors exposed by local storage.
pub trait EntityStore: Send + Sync {
    /// Returns the serialized local state of an entity, if present.
    fn get(&self, table: &str, record_id: &str) -> SyncResult<Option<Value>>;

    /// Writes the serialized state of an entity.
    fn put(&self, table: &str, record_id: &str, entity: Value) -> SyncResult<()>;
}

/// An in-memory entity store for tests and ephemeral embedding.
#[derive(Debug, Default)]
pub struct MemoryEntityStore {
    entities: RwLock<HashMap<(String, String), Value>>,
}

impl MemoryEntityStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntityStore for MemoryEntityStore {
    fn get(&self, table: &str, record_id: &str) -> SyncResult<Option<Value>> {
        Ok(self
            .entities
            .read()
            .get(&(table.to_string(), record_id.to_string()))
            .cloned())
    }

    fn put(&self, table: &str, record_id: &str, entity: Value) -> SyncResult<()> {
        if !entity.is_object() {
            return Err(SyncError::Store(format!(
                "entity {table}/{record_id} must be a JSON object"
            )));
        }
        self.entities
            .write()
            .insert((table.to_string(), record_id.to_string()), entity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_and_get() {
        let store = MemoryEntityStore::new();

        assert!(store.get("events", "e1").unwrap().is_none());

        store
            .put("events", "e1", json!({"title": "Trip"}))
            .unwrap();
        let entity = store.get("events", "e1").unwrap().unwrap();
        assert_eq!(entity["title"], "Trip");
    }

    #[test]
    fn tables_are_isolated() {
        let store = MemoryEntityStore::new();
        store.put("events", "x", json!({"a": 1})).unwrap();
        store.put("comments", "x", json!({"b": 2})).unwrap();

        assert_eq!(store.get("events", "x").unwrap().unwrap()["a"], 1);
        assert_eq!(store.get("comments", "x").unwrap().unwrap()["b"], 2);
    }

    #[test]
    fn rejects_non_object_entities() {
        let store = MemoryEntityStore::new();
        assert!(store.put("events", "e1", json!("just a string")).is_err());
    }
}
