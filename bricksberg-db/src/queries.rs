//! Read-only queries for stats and dashboards.

use bricksberg_catalog::EntityKind;
use rusqlite::{Connection, params};

use crate::operations::OperationError;

/// Record counts across the catalog and the job queue.
#[derive(Debug, Clone, Default)]
pub struct CatalogCounts {
    pub entities: Vec<(EntityKind, u64)>,
    pub relationship_lines: u64,
    pub jobs_pending: u64,
    pub jobs_running: u64,
    pub jobs_complete: u64,
    pub jobs_failed: u64,
}

impl CatalogCounts {
    pub fn count(&self, kind: EntityKind) -> u64 {
        self.entities
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

pub fn catalog_counts(conn: &Connection) -> Result<CatalogCounts, OperationError> {
    let mut entities = Vec::with_capacity(EntityKind::ALL.len());
    for kind in EntityKind::ALL {
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entities WHERE kind = ?1",
            params![kind.as_str()],
            |row| row.get(0),
        )?;
        entities.push((kind, n as u64));
    }

    let count = |sql: &str| -> Result<u64, rusqlite::Error> {
        conn.query_row(sql, [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
    };

    Ok(CatalogCounts {
        entities,
        relationship_lines: count("SELECT COUNT(*) FROM relationship_lines")?,
        jobs_pending: count("SELECT COUNT(*) FROM jobs WHERE status = 'pending'")?,
        jobs_running: count("SELECT COUNT(*) FROM jobs WHERE status = 'running'")?,
        jobs_complete: count("SELECT COUNT(*) FROM jobs WHERE status = 'complete'")?,
        jobs_failed: count("SELECT COUNT(*) FROM jobs WHERE status = 'failed'")?,
    })
}
