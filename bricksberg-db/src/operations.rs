//! CRUD operations for entity records and relationship lines.

use std::collections::BTreeMap;

use bricksberg_catalog::{EntityId, EntityKind, EntityRecord, RelationshipLine, StoredEntity, keys};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Entity not found: {entity_type} with id '{id}'")]
    NotFound { entity_type: String, id: String },
    #[error("Invalid stored value for {field}: '{value}'")]
    InvalidValue { field: String, value: String },
    #[error("A new {0} record needs a title")]
    MissingTitle(EntityKind),
}

impl OperationError {
    pub fn not_found(entity_type: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn invalid(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
        }
    }
}

// ── Entity Operations ───────────────────────────────────────────────────────

/// Find an entity of `kind` by an indexed attribute or by its title.
pub fn find_entity_by_key(
    conn: &Connection,
    kind: EntityKind,
    key_field: &str,
    key_value: &str,
) -> Result<Option<EntityId>, OperationError> {
    let result = if key_field == keys::TITLE {
        conn.query_row(
            "SELECT id FROM entities WHERE kind = ?1 AND title = ?2 ORDER BY id LIMIT 1",
            params![kind.as_str(), key_value],
            |row| row.get::<_, EntityId>(0),
        )
    } else {
        conn.query_row(
            "SELECT a.entity_id FROM entity_attributes a
             JOIN entities e ON e.id = a.entity_id
             WHERE e.kind = ?1 AND a.name = ?2 AND a.value = ?3
             ORDER BY a.entity_id LIMIT 1",
            params![kind.as_str(), key_field, key_value],
            |row| row.get::<_, EntityId>(0),
        )
    };
    match result {
        Ok(id) => Ok(Some(id)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Insert a new entity or merge a record into an existing one.
///
/// Attributes named in `record` overwrite stored values; others are kept.
pub fn upsert_entity(
    conn: &Connection,
    kind: EntityKind,
    id: Option<EntityId>,
    record: &EntityRecord,
) -> Result<EntityId, OperationError> {
    let id = match id {
        Some(id) => {
            let changed = conn.execute(
                "UPDATE entities SET
                     title = COALESCE(?2, title),
                     updated_at = datetime('now')
                 WHERE id = ?1 AND kind = ?3",
                params![id, record.title, kind.as_str()],
            )?;
            if changed == 0 {
                return Err(OperationError::not_found(kind.as_str(), id));
            }
            id
        }
        None => {
            let title = record
                .title
                .as_deref()
                .ok_or(OperationError::MissingTitle(kind))?;
            conn.execute(
                "INSERT INTO entities (kind, title) VALUES (?1, ?2)",
                params![kind.as_str(), title],
            )?;
            conn.last_insert_rowid()
        }
    };

    let mut stmt = conn.prepare_cached(
        "INSERT INTO entity_attributes (entity_id, name, value)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(entity_id, name) DO UPDATE SET value = excluded.value",
    )?;
    for (name, value) in &record.attributes {
        stmt.execute(params![id, name, value])?;
    }

    Ok(id)
}

/// Load an entity with all of its attributes.
pub fn get_entity(conn: &Connection, id: EntityId) -> Result<Option<StoredEntity>, OperationError> {
    let head = conn
        .query_row(
            "SELECT kind, title FROM entities WHERE id = ?1",
            params![id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;
    let Some((kind_str, title)) = head else {
        return Ok(None);
    };
    let kind = EntityKind::from_str_loose(&kind_str)
        .ok_or_else(|| OperationError::invalid("entities.kind", kind_str))?;

    let mut stmt =
        conn.prepare_cached("SELECT name, value FROM entity_attributes WHERE entity_id = ?1")?;
    let attributes = stmt
        .query_map(params![id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    Ok(Some(StoredEntity {
        id,
        kind,
        title,
        attributes,
    }))
}

/// Count entities of one kind.
pub fn count_entities(conn: &Connection, kind: EntityKind) -> Result<u64, OperationError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM entities WHERE kind = ?1",
        params![kind.as_str()],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

// ── Relationship Line Operations ────────────────────────────────────────────

/// Replace every line of `relation` on `parent`.
pub fn set_relationship_lines(
    conn: &Connection,
    parent: EntityId,
    relation: &str,
    lines: &[RelationshipLine],
) -> Result<(), OperationError> {
    clear_relationship_lines(conn, parent, relation)?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO relationship_lines (parent_id, relation, child_id, quantity, color_id, flag)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for line in lines {
        stmt.execute(params![
            parent,
            relation,
            line.child_id,
            line.quantity,
            line.color_id,
            line.flag,
        ])?;
    }
    Ok(())
}

pub fn clear_relationship_lines(
    conn: &Connection,
    parent: EntityId,
    relation: &str,
) -> Result<(), OperationError> {
    conn.execute(
        "DELETE FROM relationship_lines WHERE parent_id = ?1 AND relation = ?2",
        params![parent, relation],
    )?;
    Ok(())
}

/// Append a line unless an identical one is already attached.
///
/// Skipping exact duplicates keeps a replayed batch from doubling lines.
pub fn append_relationship_line(
    conn: &Connection,
    parent: EntityId,
    relation: &str,
    line: &RelationshipLine,
) -> Result<(), OperationError> {
    conn.execute(
        "INSERT INTO relationship_lines (parent_id, relation, child_id, quantity, color_id, flag)
         SELECT ?1, ?2, ?3, ?4, ?5, ?6
         WHERE NOT EXISTS (
             SELECT 1 FROM relationship_lines
             WHERE parent_id = ?1 AND relation = ?2 AND child_id = ?3 AND quantity = ?4
               AND color_id IS ?5 AND flag IS ?6
         )",
        params![
            parent,
            relation,
            line.child_id,
            line.quantity,
            line.color_id,
            line.flag,
        ],
    )?;
    Ok(())
}

pub fn relationship_lines(
    conn: &Connection,
    parent: EntityId,
    relation: &str,
) -> Result<Vec<RelationshipLine>, OperationError> {
    let mut stmt = conn.prepare_cached(
        "SELECT child_id, quantity, color_id, flag FROM relationship_lines
         WHERE parent_id = ?1 AND relation = ?2 ORDER BY id",
    )?;
    let lines = stmt
        .query_map(params![parent, relation], |row| {
            Ok(RelationshipLine {
                child_id: row.get(0)?,
                quantity: row.get(1)?,
                color_id: row.get(2)?,
                flag: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines)
}

pub fn parents_with_relation(
    conn: &Connection,
    relation: &str,
) -> Result<Vec<EntityId>, OperationError> {
    let mut stmt = conn.prepare_cached(
        "SELECT DISTINCT parent_id FROM relationship_lines WHERE relation = ?1 ORDER BY parent_id",
    )?;
    let parents = stmt
        .query_map(params![relation], |row| row.get::<_, EntityId>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parents)
}
