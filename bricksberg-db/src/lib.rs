//! SQLite persistence layer for the brick catalog and its import queue.
//!
//! Provides schema creation, entity CRUD behind the [`EntityStore`] seam,
//! job/task persistence, and the global scheduler lock, backed by SQLite
//! (via rusqlite with bundled feature).
//!
//! [`EntityStore`]: bricksberg_catalog::EntityStore

pub mod jobs;
pub mod lock;
pub mod operations;
pub mod queries;
pub mod schema;
pub mod staging;
pub mod store;
mod timestamp;

pub use jobs::{
    JobRow, append_job_log, delete_job, fail_job_status, insert_job, job_activity, job_log_tail,
    job_status, list_jobs, load_job, next_runnable_job, save_task, set_current_task_index,
    touch_job, transition_job_status,
};
pub use lock::{LockHolder, lock_holder, release_lock, request_wake, take_wake_request, try_acquire_lock};
pub use operations::{
    OperationError, append_relationship_line, clear_relationship_lines, count_entities,
    find_entity_by_key, get_entity, parents_with_relation, relationship_lines,
    set_relationship_lines, upsert_entity,
};
pub use queries::{CatalogCounts, catalog_counts};
pub use schema::{SchemaError, open_database, open_memory};
pub use staging::{
    discard_staging, mark_parent_cleared, stage_relationship_line, staged_lines, staged_parents,
};
pub use store::SqliteEntityStore;
