//! [`EntityStore`] implementation over a SQLite connection.

use bricksberg_catalog::{
    EntityId, EntityKind, EntityRecord, EntityStore, RelationshipLine, StoreError, StoredEntity,
};
use rusqlite::Connection;

use crate::operations::{self, OperationError};

impl From<OperationError> for StoreError {
    fn from(e: OperationError) -> Self {
        match e {
            OperationError::MissingTitle(kind) => StoreError::MissingTitle(kind),
            other => StoreError::backend(other.to_string()),
        }
    }
}

/// Entity store backed by the pipeline database.
pub struct SqliteEntityStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteEntityStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl EntityStore for SqliteEntityStore<'_> {
    fn find_by_key(
        &self,
        kind: EntityKind,
        key_field: &str,
        key_value: &str,
    ) -> Result<Option<EntityId>, StoreError> {
        Ok(operations::find_entity_by_key(
            self.conn, kind, key_field, key_value,
        )?)
    }

    fn upsert(
        &self,
        kind: EntityKind,
        id: Option<EntityId>,
        record: &EntityRecord,
    ) -> Result<EntityId, StoreError> {
        match operations::upsert_entity(self.conn, kind, id, record) {
            Err(OperationError::NotFound { .. }) => Err(StoreError::NotFound {
                kind,
                id: id.unwrap_or_default(),
            }),
            other => Ok(other?),
        }
    }

    fn get(&self, id: EntityId) -> Result<Option<StoredEntity>, StoreError> {
        Ok(operations::get_entity(self.conn, id)?)
    }

    fn count(&self, kind: EntityKind) -> Result<u64, StoreError> {
        Ok(operations::count_entities(self.conn, kind)?)
    }

    fn set_relationship_lines(
        &self,
        parent: EntityId,
        relation: &str,
        lines: &[RelationshipLine],
    ) -> Result<(), StoreError> {
        Ok(operations::set_relationship_lines(
            self.conn, parent, relation, lines,
        )?)
    }

    fn clear_relationship_lines(
        &self,
        parent: EntityId,
        relation: &str,
    ) -> Result<(), StoreError> {
        Ok(operations::clear_relationship_lines(
            self.conn, parent, relation,
        )?)
    }

    fn append_relationship_line(
        &self,
        parent: EntityId,
        relation: &str,
        line: &RelationshipLine,
    ) -> Result<(), StoreError> {
        Ok(operations::append_relationship_line(
            self.conn, parent, relation, line,
        )?)
    }

    fn relationship_lines(
        &self,
        parent: EntityId,
        relation: &str,
    ) -> Result<Vec<RelationshipLine>, StoreError> {
        Ok(operations::relationship_lines(self.conn, parent, relation)?)
    }

    fn parents_with_relation(&self, relation: &str) -> Result<Vec<EntityId>, StoreError> {
        Ok(operations::parents_with_relation(self.conn, relation)?)
    }
}
