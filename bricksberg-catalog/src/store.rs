//! The entity store seam consumed by the import pipeline.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::types::{EntityId, EntityKind, EntityRecord, RelationshipLine};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),
    #[error("Entity not found: {kind} with id {id}")]
    NotFound { kind: EntityKind, id: EntityId },
    #[error("A new {0} record needs a title")]
    MissingTitle(EntityKind),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// A record as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub title: String,
    pub attributes: BTreeMap<String, String>,
}

impl StoredEntity {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Durable storage for entity records and their relationship lines.
///
/// Every operation must be safe to retry: replaying a batch after a crash
/// has to converge on the same state instead of producing duplicates.
pub trait EntityStore {
    /// Find a record of `kind` whose `key_field` equals `key_value`.
    ///
    /// The key field [`keys::TITLE`](crate::types::keys::TITLE) matches the
    /// record title; any other field matches an attribute.
    fn find_by_key(
        &self,
        kind: EntityKind,
        key_field: &str,
        key_value: &str,
    ) -> Result<Option<EntityId>, StoreError>;

    /// Create a record (`id == None`) or merge into an existing one.
    fn upsert(
        &self,
        kind: EntityKind,
        id: Option<EntityId>,
        record: &EntityRecord,
    ) -> Result<EntityId, StoreError>;

    fn get(&self, id: EntityId) -> Result<Option<StoredEntity>, StoreError>;

    fn count(&self, kind: EntityKind) -> Result<u64, StoreError>;

    /// Replace every line of `relation` on `parent` with `lines`.
    fn set_relationship_lines(
        &self,
        parent: EntityId,
        relation: &str,
        lines: &[RelationshipLine],
    ) -> Result<(), StoreError>;

    fn clear_relationship_lines(&self, parent: EntityId, relation: &str)
    -> Result<(), StoreError>;

    fn append_relationship_line(
        &self,
        parent: EntityId,
        relation: &str,
        line: &RelationshipLine,
    ) -> Result<(), StoreError>;

    /// Lines of `relation` on `parent`, in insertion order.
    fn relationship_lines(
        &self,
        parent: EntityId,
        relation: &str,
    ) -> Result<Vec<RelationshipLine>, StoreError>;

    /// Every parent that currently holds at least one line of `relation`.
    fn parents_with_relation(&self, relation: &str) -> Result<Vec<EntityId>, StoreError>;
}
