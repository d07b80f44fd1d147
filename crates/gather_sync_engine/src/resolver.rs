//! Conflict resolution.
//!
//! Merge behavior is selected through a registry keyed by table name, one
//! typed strategy per entity kind, instead of a string-keyed conditional.
//!
//! The stock strategy is last-writer-wins per scalar field with set-union for
//! monotonically growing collections. Union-only merge cannot express removal:
//! a participant who left can be resurrected by a stale remote union. This is
//! a known semantic gap of the model; removal markers are not part of the
//! wire contract.

use crate::error::SyncResult;
use crate::store::EntityStore;
use chrono::{DateTime, Utc};
use gather_sync_protocol::{server_is_newer, SyncConflict};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// The result of merging one conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// The merged entity to write back to local storage.
    Merged(Value),
    /// Local state stands; nothing is written.
    KeepLocal,
}

/// A per-entity-kind merge policy.
pub trait MergeStrategy: Send + Sync {
    /// Strategy name, recorded with conflict metrics.
    fn name(&self) -> &'static str;

    /// Merges the local and server versions of one entity.
    fn merge(&self, local: &Value, server: &Value, server_timestamp: DateTime<Utc>)
        -> MergeOutcome;
}

/// Last-writer-wins with identity and set-union field classes.
///
/// - Identity fields are never overwritten by a merge; they always come from
///   the local document (falling back to the server's value only when local
///   has none).
/// - Set-union fields are merged as deduplicated array unions, never
///   subtractive.
/// - Every other field is taken from whichever side wrote last, comparing the
///   local document's `updatedAt` against the conflict's server timestamp.
///   Ties favor local.
#[derive(Debug, Clone, Default)]
pub struct LwwMerge {
    identity_fields: Vec<String>,
    set_union_fields: Vec<String>,
}

impl LwwMerge {
    /// Creates a strategy with no identity or set-union fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares fields that are never overwritten by merge.
    pub fn with_identity<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identity_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Declares monotonically growing collection fields.
    pub fn with_set_union<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_union_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    fn union_arrays(local: &Value, server: &Value) -> Value {
        let mut merged: Vec<Value> = Vec::new();
        for side in [local, server] {
            if let Some(items) = side.as_array() {
                for item in items {
                    if !merged.contains(item) {
                        merged.push(item.clone());
                    }
                }
            }
        }
        Value::Array(merged)
    }
}

impl MergeStrategy for LwwMerge {
    fn name(&self) -> &'static str {
        "lww"
    }

    fn merge(
        &self,
        local: &Value,
        server: &Value,
        server_timestamp: DateTime<Utc>,
    ) -> MergeOutcome {
        let local_map = local.as_object().cloned().unwrap_or_default();
        let server_map = server.as_object().cloned().unwrap_or_default();

        let local_updated_at = local_map.get("updatedAt").and_then(Value::as_str);
        let server_wins = server_is_newer(local_updated_at, server_timestamp);

        // Loser's fields as the base, winner's overlaid: a field present on
        // only one side always survives.
        let (base, overlay) = if server_wins {
            (&local_map, &server_map)
        } else {
            (&server_map, &local_map)
        };

        let mut merged: Map<String, Value> = base.clone();
        for (key, value) in overlay {
            merged.insert(key.clone(), value.clone());
        }

        // Identity comes from local; with no local value the overlay stands.
        for field in &self.identity_fields {
            if let Some(value) = local_map.get(field) {
                merged.insert(field.clone(), value.clone());
            }
        }

        for field in &self.set_union_fields {
            let local_items = local_map.get(field).unwrap_or(&Value::Null);
            let server_items = server_map.get(field).unwrap_or(&Value::Null);
            if local_items.is_array() || server_items.is_array() {
                merged.insert(field.clone(), Self::union_arrays(local_items, server_items));
            }
        }

        MergeOutcome::Merged(Value::Object(merged))
    }
}

/// Fallback for unregistered tables: the local version stands unmodified.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalWins;

impl MergeStrategy for LocalWins {
    fn name(&self) -> &'static str {
        "local-wins"
    }

    fn merge(&self, _local: &Value, _server: &Value, _ts: DateTime<Utc>) -> MergeOutcome {
        MergeOutcome::KeepLocal
    }
}

/// Registry mapping table names to merge strategies.
pub struct MergeRegistry {
    strategies: HashMap<String, Arc<dyn MergeStrategy>>,
    fallback: Arc<dyn MergeStrategy>,
}

impl MergeRegistry {
    /// Creates an empty registry with the given fallback strategy.
    pub fn new(fallback: Arc<dyn MergeStrategy>) -> Self {
        Self {
            strategies: HashMap::new(),
            fallback,
        }
    }

    /// Registers a strategy for a table.
    pub fn register(&mut self, table: impl Into<String>, strategy: Arc<dyn MergeStrategy>) {
        self.strategies.insert(table.into(), strategy);
    }

    /// Returns the strategy for a table, or the fallback.
    pub fn strategy_for(&self, table: &str) -> &Arc<dyn MergeStrategy> {
        self.strategies.get(table).unwrap_or(&self.fallback)
    }
}

impl Default for MergeRegistry {
    fn default() -> Self {
        default_registry()
    }
}

/// Builds the registry for the app's entity kinds.
///
/// Unknown tables fall back to [`LocalWins`] rather than failing the pass.
pub fn default_registry() -> MergeRegistry {
    let mut registry = MergeRegistry::new(Arc::new(LocalWins));

    let event_merge = Arc::new(
        LwwMerge::new()
            .with_identity(["id", "organizerId", "createdAt"])
            .with_set_union(["participants"]),
    );
    registry.register("events", Arc::clone(&event_merge) as Arc<dyn MergeStrategy>);

    for table in ["activities", "meals"] {
        registry.register(
            table,
            Arc::new(
                LwwMerge::new()
                    .with_identity(["id", "createdBy", "createdAt"])
                    .with_set_union(["participants"]),
            ),
        );
    }

    for table in ["comments", "budgets", "votes"] {
        registry.register(
            table,
            Arc::new(LwwMerge::new().with_identity(["id", "createdAt"])),
        );
    }

    registry
}

/// What the resolver did with one conflict.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Table the conflict belonged to.
    pub table: String,
    /// Name of the strategy that handled it.
    pub strategy: &'static str,
    /// Whether local storage was mutated.
    pub mutated: bool,
}

/// Applies merge strategies to server-reported conflicts and writes results
/// back to local storage.
pub struct ConflictResolver<S: EntityStore> {
    store: Arc<S>,
    registry: MergeRegistry,
}

impl<S: EntityStore> ConflictResolver<S> {
    /// Creates a resolver over the given store with the default registry.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_registry(store, default_registry())
    }

    /// Creates a resolver with a custom registry.
    pub fn with_registry(store: Arc<S>, registry: MergeRegistry) -> Self {
        Self { store, registry }
    }

    /// Replaces the merge registry.
    pub fn set_registry(&mut self, registry: MergeRegistry) {
        self.registry = registry;
    }

    /// Resolves one conflict.
    ///
    /// The merged entity is written back to local storage before the caller
    /// marks the change resolved, so a crash between the two leaves the merge
    /// durable and the change still pending (re-resolution is idempotent).
    pub fn resolve(&self, conflict: &SyncConflict) -> SyncResult<Resolution> {
        let strategy = self.registry.strategy_for(&conflict.table);

        let local = self.store.get(&conflict.table, &conflict.record_id)?;
        let outcome = match &local {
            Some(local) => strategy.merge(local, &conflict.server_data, conflict.server_timestamp),
            // Nothing local to defend: adopt the authoritative state.
            None => MergeOutcome::Merged(conflict.server_data.clone()),
        };

        let mutated = match outcome {
            MergeOutcome::Merged(entity) => {
                self.store
                    .put(&conflict.table, &conflict.record_id, entity)?;
                true
            }
            MergeOutcome::KeepLocal => false,
        };

        debug!(
            table = %conflict.table,
            record_id = %conflict.record_id,
            strategy = strategy.name(),
            mutated,
            "conflict resolved"
        );

        Ok(Resolution {
            table: conflict.table.clone(),
            strategy: strategy.name(),
            mutated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryEntityStore;
    use gather_sync_protocol::parse_timestamp;
    use serde_json::json;
    use uuid::Uuid;

    fn make_conflict(table: &str, record_id: &str, server_data: Value, ts: &str) -> SyncConflict {
        SyncConflict {
            change_id: Uuid::new_v4(),
            table: table.into(),
            record_id: record_id.into(),
            server_data,
            server_timestamp: parse_timestamp(ts).unwrap(),
        }
    }

    #[test]
    fn server_newer_wins_scalars() {
        let strategy = LwwMerge::new().with_identity(["id"]);
        let local = json!({"id": "e1", "title": "A", "updatedAt": "2026-03-01T12:00:00Z"});
        let server = json!({"id": "e1", "title": "B"});
        let ts = parse_timestamp("2026-03-01T13:00:00Z").unwrap();

        let MergeOutcome::Merged(merged) = strategy.merge(&local, &server, ts) else {
            panic!("expected merge");
        };
        assert_eq!(merged["title"], "B");
    }

    #[test]
    fn local_newer_keeps_scalars() {
        let strategy = LwwMerge::new().with_identity(["id"]);
        let local = json!({"id": "e1", "title": "A", "updatedAt": "2026-03-01T14:00:00Z"});
        let server = json!({"id": "e1", "title": "B"});
        let ts = parse_timestamp("2026-03-01T13:00:00Z").unwrap();

        let MergeOutcome::Merged(merged) = strategy.merge(&local, &server, ts) else {
            panic!("expected merge");
        };
        assert_eq!(merged["title"], "A");
    }

    #[test]
    fn tie_favors_local() {
        let strategy = LwwMerge::new();
        let local = json!({"title": "A", "updatedAt": "2026-03-01T13:00:00Z"});
        let server = json!({"title": "B"});
        let ts = parse_timestamp("2026-03-01T13:00:00Z").unwrap();

        let MergeOutcome::Merged(merged) = strategy.merge(&local, &server, ts) else {
            panic!("expected merge");
        };
        assert_eq!(merged["title"], "A");
    }

    #[test]
    fn participants_union_never_subtracts() {
        let strategy = LwwMerge::new().with_set_union(["participants"]);
        let local = json!({"participants": ["u1", "u2"], "updatedAt": "2026-03-01T14:00:00Z"});
        let server = json!({"participants": ["u2", "u3"]});
        let ts = parse_timestamp("2026-03-01T13:00:00Z").unwrap();

        let MergeOutcome::Merged(merged) = strategy.merge(&local, &server, ts) else {
            panic!("expected merge");
        };
        let participants = merged["participants"].as_array().unwrap();
        assert_eq!(participants, &[json!("u1"), json!("u2"), json!("u3")]);
    }

    #[test]
    fn identity_fields_always_local() {
        let strategy = LwwMerge::new().with_identity(["id", "organizerId", "createdAt"]);
        let local = json!({
            "id": "e1",
            "organizerId": "u1",
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-03-01T12:00:00Z"
        });
        let server = json!({
            "id": "e1-rewritten",
            "organizerId": "u9",
            "createdAt": "2026-02-02T00:00:00Z",
            "title": "B"
        });
        let ts = parse_timestamp("2026-03-01T13:00:00Z").unwrap();

        let MergeOutcome::Merged(merged) = strategy.merge(&local, &server, ts) else {
            panic!("expected merge");
        };
        assert_eq!(merged["id"], "e1");
        assert_eq!(merged["organizerId"], "u1");
        assert_eq!(merged["createdAt"], "2026-01-01T00:00:00Z");
        // Non-identity field still taken from the newer server side
        assert_eq!(merged["title"], "B");
    }

    #[test]
    fn fields_present_on_one_side_survive() {
        let strategy = LwwMerge::new();
        let local = json!({"notes": "bring snacks", "updatedAt": "2026-03-01T12:00:00Z"});
        let server = json!({"title": "B"});
        let ts = parse_timestamp("2026-03-01T13:00:00Z").unwrap();

        let MergeOutcome::Merged(merged) = strategy.merge(&local, &server, ts) else {
            panic!("expected merge");
        };
        assert_eq!(merged["notes"], "bring snacks");
        assert_eq!(merged["title"], "B");
    }

    #[test]
    fn resolver_writes_back_before_reporting() {
        let store = Arc::new(MemoryEntityStore::new());
        store
            .put(
                "events",
                "e1",
                json!({"id": "e1", "title": "Trip", "updatedAt": "2026-03-01T12:00:00Z"}),
            )
            .unwrap();

        let resolver = ConflictResolver::new(Arc::clone(&store));
        let conflict = make_conflict(
            "events",
            "e1",
            json!({"id": "e1", "title": "Trip v2"}),
            "2026-03-01T13:00:00Z",
        );

        let resolution = resolver.resolve(&conflict).unwrap();
        assert!(resolution.mutated);
        assert_eq!(resolution.strategy, "lww");

        let entity = store.get("events", "e1").unwrap().unwrap();
        assert_eq!(entity["title"], "Trip v2");
    }

    #[test]
    fn resolver_adopts_server_data_when_local_missing() {
        let store = Arc::new(MemoryEntityStore::new());
        let resolver = ConflictResolver::new(Arc::clone(&store));

        let conflict = make_conflict(
            "events",
            "e9",
            json!({"id": "e9", "title": "Dinner"}),
            "2026-03-01T13:00:00Z",
        );

        let resolution = resolver.resolve(&conflict).unwrap();
        assert!(resolution.mutated);
        assert_eq!(
            store.get("events", "e9").unwrap().unwrap()["title"],
            "Dinner"
        );
    }

    #[test]
    fn unknown_table_keeps_local() {
        let store = Arc::new(MemoryEntityStore::new());
        store
            .put("gadgets", "g1", json!({"id": "g1", "name": "local"}))
            .unwrap();

        let resolver = ConflictResolver::new(Arc::clone(&store));
        let conflict = make_conflict(
            "gadgets",
            "g1",
            json!({"id": "g1", "name": "remote"}),
            "2026-03-01T13:00:00Z",
        );

        let resolution = resolver.resolve(&conflict).unwrap();
        assert!(!resolution.mutated);
        assert_eq!(resolution.strategy, "local-wins");
        assert_eq!(store.get("gadgets", "g1").unwrap().unwrap()["name"], "local");
    }

    #[test]
    fn default_registry_covers_app_tables() {
        let registry = default_registry();
        assert_eq!(registry.strategy_for("events").name(), "lww");
        assert_eq!(registry.strategy_for("comments").name(), "lww");
        assert_eq!(registry.strategy_for("unheard-of").name(), "local-wins");
    }
}
