//! Per-job bookkeeping for relationship imports.
//!
//! Relationship tasks span many ticks, so the set of parents already cleared
//! and the lines buffered for a final replacing write are kept in the
//! database rather than in process memory.

use bricksberg_catalog::{EntityId, JobId, RelationshipLine};
use rusqlite::{Connection, params};

use crate::operations::OperationError;

/// Record that `parent` had its `relation` lines cleared during this job.
///
/// Returns true the first time, false if it was already marked.
pub fn mark_parent_cleared(
    conn: &Connection,
    job_id: JobId,
    relation: &str,
    parent: EntityId,
) -> Result<bool, OperationError> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO relationship_clears (job_id, relation, parent_id) VALUES (?1, ?2, ?3)",
        params![job_id, relation, parent],
    )?;
    Ok(changed > 0)
}

/// Buffer a line for `parent`. Identical lines are stored once.
pub fn stage_relationship_line(
    conn: &Connection,
    job_id: JobId,
    relation: &str,
    parent: EntityId,
    line: &RelationshipLine,
) -> Result<(), OperationError> {
    conn.prepare_cached(
        "INSERT OR IGNORE INTO relationship_staging
             (job_id, relation, parent_id, child_id, quantity, color_id, flag)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?
    .execute(params![
        job_id,
        relation,
        parent,
        line.child_id,
        line.quantity,
        line.color_id,
        line.flag,
    ])?;
    Ok(())
}

/// Parents with buffered lines for `relation`, in first-staged order.
pub fn staged_parents(
    conn: &Connection,
    job_id: JobId,
    relation: &str,
) -> Result<Vec<EntityId>, OperationError> {
    let mut stmt = conn.prepare_cached(
        "SELECT parent_id FROM relationship_staging
         WHERE job_id = ?1 AND relation = ?2
         GROUP BY parent_id ORDER BY MIN(id)",
    )?;
    let parents = stmt
        .query_map(params![job_id, relation], |row| row.get::<_, EntityId>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parents)
}

pub fn staged_lines(
    conn: &Connection,
    job_id: JobId,
    relation: &str,
    parent: EntityId,
) -> Result<Vec<RelationshipLine>, OperationError> {
    let mut stmt = conn.prepare_cached(
        "SELECT child_id, quantity, color_id, flag FROM relationship_staging
         WHERE job_id = ?1 AND relation = ?2 AND parent_id = ?3 ORDER BY id",
    )?;
    let lines = stmt
        .query_map(params![job_id, relation, parent], |row| {
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

/// Drop staged lines and clear markers of `relation` for a job.
pub fn discard_staging(
    conn: &Connection,
    job_id: JobId,
    relation: &str,
) -> Result<(), OperationError> {
    conn.execute(
        "DELETE FROM relationship_staging WHERE job_id = ?1 AND relation = ?2",
        params![job_id, relation],
    )?;
    conn.execute(
        "DELETE FROM relationship_clears WHERE job_id = ?1 AND relation = ?2",
        params![job_id, relation],
    )?;
    Ok(())
}
