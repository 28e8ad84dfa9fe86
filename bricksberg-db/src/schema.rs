//! SQLite schema creation and migration.

use rusqlite::Connection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: expected version {expected}, found {found}")]
    VersionMismatch { expected: i32, found: i32 },
}

/// Current schema version. Increment when adding migrations.
pub const CURRENT_VERSION: i32 = 1;

/// Create all tables and indexes if they don't exist.
///
/// This is idempotent, so it is safe to call on an existing database.
pub fn create_schema(conn: &Connection) -> Result<(), SchemaError> {
    conn.execute_batch(SCHEMA_SQL)?;
    set_schema_version(conn, CURRENT_VERSION)?;
    Ok(())
}

/// Open or create a pipeline database at the given path.
pub fn open_database(path: &std::path::Path) -> Result<Connection, SchemaError> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    let version = get_schema_version(&conn)?;
    if version == 0 {
        create_schema(&conn)?;
    } else if version != CURRENT_VERSION {
        migrate(&conn, version)?;
    }

    Ok(conn)
}

/// Open an in-memory database with the full schema. Useful for testing.
pub fn open_memory() -> Result<Connection, SchemaError> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Get the current schema version, or 0 if no schema exists.
pub fn get_schema_version(conn: &Connection) -> Result<i32, SchemaError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), SchemaError> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Run migrations from `from_version` up to `CURRENT_VERSION`.
fn migrate(conn: &Connection, from_version: i32) -> Result<(), SchemaError> {
    if from_version > CURRENT_VERSION {
        return Err(SchemaError::VersionMismatch {
            expected: CURRENT_VERSION,
            found: from_version,
        });
    }

    let mut version = from_version;
    while version < CURRENT_VERSION {
        // No released schema predates version 1 yet.
        version += 1;
        set_schema_version(conn, version)?;
    }

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Entity records (colors, themes, parts, sets, ...)
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_entities_kind_title ON entities(kind, title);

-- Type-specific attributes; external identifiers live here too
CREATE TABLE IF NOT EXISTS entity_attributes (
    entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (entity_id, name)
);

CREATE INDEX IF NOT EXISTS idx_entity_attributes_lookup ON entity_attributes(name, value);

-- Repeated child lines attached to a parent record
CREATE TABLE IF NOT EXISTS relationship_lines (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    relation TEXT NOT NULL,
    child_id INTEGER NOT NULL,
    quantity INTEGER NOT NULL,
    color_id INTEGER,
    flag TEXT
);

CREATE INDEX IF NOT EXISTS idx_relationship_lines_parent ON relationship_lines(parent_id, relation);
CREATE INDEX IF NOT EXISTS idx_relationship_lines_relation ON relationship_lines(relation);

-- Import jobs
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    current_task_index INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    last_activity TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status, last_activity);

-- One task per source file, in queue order
CREATE TABLE IF NOT EXISTS tasks (
    job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    type_key TEXT NOT NULL,
    source_path TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    rows_processed INTEGER NOT NULL DEFAULT 0,
    total_rows INTEGER,
    header_map TEXT,
    PRIMARY KEY (job_id, position)
);

CREATE TABLE IF NOT EXISTS job_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    logged_at TEXT NOT NULL,
    message TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_job_log_job ON job_log(job_id, id);

-- Single-row global lock; job_id may name a job that no longer exists
CREATE TABLE IF NOT EXISTS scheduler_lock (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    job_id INTEGER,
    acquired_at TEXT
);

INSERT OR IGNORE INTO scheduler_lock (id, job_id, acquired_at) VALUES (1, NULL, NULL);

-- Single-row wake request raised by job submission
CREATE TABLE IF NOT EXISTS scheduler_wake (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    requested_at TEXT
);

INSERT OR IGNORE INTO scheduler_wake (id, requested_at) VALUES (1, NULL);

-- Parents whose relation lines were already cleared during a job
CREATE TABLE IF NOT EXISTS relationship_clears (
    job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    relation TEXT NOT NULL,
    parent_id INTEGER NOT NULL,
    PRIMARY KEY (job_id, relation, parent_id)
);

-- Relation lines buffered until the task's file is fully read
CREATE TABLE IF NOT EXISTS relationship_staging (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    relation TEXT NOT NULL,
    parent_id INTEGER NOT NULL,
    child_id INTEGER NOT NULL,
    quantity INTEGER NOT NULL,
    color_id INTEGER,
    flag TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_relationship_staging_line ON relationship_staging(
    job_id, relation, parent_id, child_id, quantity, COALESCE(color_id, -1), COALESCE(flag, '')
);
"#;
