//! Per-job-run resolution cache.
//!
//! Memoizes `(kind, key field, key value) -> entity id` lookups, including
//! misses, so each distinct lookup reaches the store at most once per run.

use std::collections::HashMap;

use bricksberg_catalog::{EntityId, EntityKind, EntityStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LookupKey {
    kind: EntityKind,
    field: String,
    value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AnyKey {
    kind: EntityKind,
    fields: &'static [&'static str],
    value: String,
}

/// Hit/miss counters, reported when a task completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub store_queries: u64,
    pub negative_entries: u64,
}

#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: HashMap<LookupKey, Option<EntityId>>,
    any: HashMap<AnyKey, Option<EntityId>>,
    stats: CacheStats,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything, for the start of a new job run.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.any.clear();
        self.stats = CacheStats::default();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.any.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.any.is_empty()
    }

    /// Resolve one key field, consulting the store only on the first lookup.
    pub fn resolve(
        &mut self,
        store: &dyn EntityStore,
        kind: EntityKind,
        field: &str,
        value: &str,
    ) -> Result<Option<EntityId>, StoreError> {
        let key = LookupKey {
            kind,
            field: field.to_string(),
            value: value.to_string(),
        };
        if let Some(cached) = self.entries.get(&key) {
            self.stats.hits += 1;
            return Ok(*cached);
        }

        self.stats.store_queries += 1;
        let found = store.find_by_key(kind, field, value)?;
        if found.is_none() {
            self.stats.negative_entries += 1;
        }
        self.entries.insert(key, found);
        Ok(found)
    }

    /// Resolve a value against several key fields in priority order.
    ///
    /// Stops at the first field that matches. The outcome is cached per value
    /// so later lookups never try a different field.
    pub fn resolve_any(
        &mut self,
        store: &dyn EntityStore,
        kind: EntityKind,
        fields: &'static [&'static str],
        value: &str,
    ) -> Result<Option<EntityId>, StoreError> {
        let key = AnyKey {
            kind,
            fields,
            value: value.to_string(),
        };
        if let Some(cached) = self.any.get(&key) {
            self.stats.hits += 1;
            return Ok(*cached);
        }

        let mut found = None;
        for field in fields {
            if let Some(id) = self.resolve(store, kind, field, value)? {
                found = Some(id);
                break;
            }
        }
        self.any.insert(key, found);
        Ok(found)
    }

    /// Resolve a value against several kinds in order, stopping at the first hit.
    pub fn resolve_in_kinds(
        &mut self,
        store: &dyn EntityStore,
        kinds: &[EntityKind],
        field: &str,
        value: &str,
    ) -> Result<Option<(EntityKind, EntityId)>, StoreError> {
        for &kind in kinds {
            if let Some(id) = self.resolve(store, kind, field, value)? {
                return Ok(Some((kind, id)));
            }
        }
        Ok(None)
    }

    /// Record an id created or found during the run.
    ///
    /// Overwrites a cached miss for the same key, and drops multi-field
    /// results for the value so they are recomputed.
    pub fn remember(&mut self, kind: EntityKind, field: &str, value: &str, id: EntityId) {
        let key = LookupKey {
            kind,
            field: field.to_string(),
            value: value.to_string(),
        };
        self.entries.insert(key, Some(id));
        self.any
            .retain(|k, cached| !(k.kind == kind && k.value == value && cached.is_none()));
    }

    /// Record that a key no longer resolves, after the store dropped it.
    ///
    /// Multi-field results for the value are dropped as well.
    pub fn forget(&mut self, kind: EntityKind, field: &str, value: &str) {
        let key = LookupKey {
            kind,
            field: field.to_string(),
            value: value.to_string(),
        };
        self.entries.insert(key, None);
        self.any.retain(|k, _| !(k.kind == kind && k.value == value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;

    use bricksberg_catalog::{EntityRecord, RelationshipLine, StoredEntity, keys};

    /// In-memory store keyed by (kind, field, value) that counts lookups.
    #[derive(Default)]
    struct FakeStore {
        keys: RefCell<BTreeMap<(EntityKind, String, String), EntityId>>,
        lookups: Cell<u32>,
    }

    impl FakeStore {
        fn with(self, kind: EntityKind, field: &str, value: &str, id: EntityId) -> Self {
            self.keys
                .borrow_mut()
                .insert((kind, field.to_string(), value.to_string()), id);
            self
        }
    }

    impl EntityStore for FakeStore {
        fn find_by_key(
            &self,
            kind: EntityKind,
            key_field: &str,
            key_value: &str,
        ) -> Result<Option<EntityId>, StoreError> {
            self.lookups.set(self.lookups.get() + 1);
            Ok(self
                .keys
                .borrow()
                .get(&(kind, key_field.to_string(), key_value.to_string()))
                .copied())
        }
        fn upsert(&self, _: EntityKind, _: Option<EntityId>, _: &EntityRecord) -> Result<EntityId, StoreError> {
            unimplemented!()
        }
        fn get(&self, _: EntityId) -> Result<Option<StoredEntity>, StoreError> {
            Ok(None)
        }
        fn count(&self, _: EntityKind) -> Result<u64, StoreError> {
            Ok(0)
        }
        fn set_relationship_lines(&self, _: EntityId, _: &str, _: &[RelationshipLine]) -> Result<(), StoreError> {
            Ok(())
        }
        fn clear_relationship_lines(&self, _: EntityId, _: &str) -> Result<(), StoreError> {
            Ok(())
        }
        fn append_relationship_line(&self, _: EntityId, _: &str, _: &RelationshipLine) -> Result<(), StoreError> {
            Ok(())
        }
        fn relationship_lines(&self, _: EntityId, _: &str) -> Result<Vec<RelationshipLine>, StoreError> {
            Ok(vec![])
        }
        fn parents_with_relation(&self, _: &str) -> Result<Vec<EntityId>, StoreError> {
            Ok(vec![])
        }
    }

    #[test]
    fn negative_lookups_hit_the_store_once() {
        let store = FakeStore::default();
        let mut cache = ResolutionCache::new();
        for _ in 0..3 {
            let found = cache
                .resolve(&store, EntityKind::Set, keys::SET_NUM, "10179-1")
                .unwrap();
            assert_eq!(found, None);
        }
        assert_eq!(store.lookups.get(), 1);
        assert_eq!(cache.stats().hits, 2);
        assert_eq!(cache.stats().negative_entries, 1);
    }

    #[test]
    fn any_key_stops_at_first_match_in_priority_order() {
        let store = FakeStore::default()
            .with(EntityKind::Part, keys::BRICKOWL_ID, "3001", 7)
            .with(EntityKind::Part, keys::BRICKLINK_ID, "3001", 9);
        let mut cache = ResolutionCache::new();

        let found = cache
            .resolve_any(&store, EntityKind::Part, keys::PART_ANY, "3001")
            .unwrap();
        assert_eq!(found, Some(7));
        // part_num, rebrickable_id, brickowl_id
        assert_eq!(store.lookups.get(), 3);

        cache
            .resolve_any(&store, EntityKind::Part, keys::PART_ANY, "3001")
            .unwrap();
        assert_eq!(store.lookups.get(), 3);
    }

    #[test]
    fn remember_overrides_cached_miss() {
        let store = FakeStore::default();
        let mut cache = ResolutionCache::new();
        assert_eq!(
            cache
                .resolve_any(&store, EntityKind::Part, keys::PART_ANY, "3001")
                .unwrap(),
            None
        );

        cache.remember(EntityKind::Part, keys::PART_NUM, "3001", 42);
        assert_eq!(
            cache
                .resolve_any(&store, EntityKind::Part, keys::PART_ANY, "3001")
                .unwrap(),
            Some(42)
        );
        assert_eq!(
            cache
                .resolve(&store, EntityKind::Part, keys::PART_NUM, "3001")
                .unwrap(),
            Some(42)
        );
    }

    #[test]
    fn forget_turns_a_hit_into_a_cached_miss() {
        let store = FakeStore::default().with(EntityKind::Set, keys::INVENTORY_ID, "11", 5);
        let mut cache = ResolutionCache::new();
        assert_eq!(
            cache
                .resolve(&store, EntityKind::Set, keys::INVENTORY_ID, "11")
                .unwrap(),
            Some(5)
        );

        cache.forget(EntityKind::Set, keys::INVENTORY_ID, "11");
        assert_eq!(
            cache
                .resolve(&store, EntityKind::Set, keys::INVENTORY_ID, "11")
                .unwrap(),
            None
        );
        assert_eq!(store.lookups.get(), 1);
    }

    #[test]
    fn kinds_are_tried_in_order() {
        let store = FakeStore::default().with(EntityKind::Minifigure, keys::INVENTORY_ID, "55", 3);
        let mut cache = ResolutionCache::new();
        let found = cache
            .resolve_in_kinds(
                &store,
                &[EntityKind::Set, EntityKind::Minifigure],
                keys::INVENTORY_ID,
                "55",
            )
            .unwrap();
        assert_eq!(found, Some((EntityKind::Minifigure, 3)));
    }

    #[test]
    fn reset_clears_entries_and_stats() {
        let store = FakeStore::default();
        let mut cache = ResolutionCache::new();
        cache
            .resolve(&store, EntityKind::Color, keys::REBRICKABLE_ID, "0")
            .unwrap();
        assert!(!cache.is_empty());
        cache.reset();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
