//! Job creation, submission and queue advancement.

use std::path::PathBuf;

use bricksberg_catalog::{EntityKind, Job, JobId, JobKind, JobStatus, Task, TaskStatus};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::{PipelineError, QueueError, SkipReason};
use crate::joblog::JobLog;

/// Catalog type keys in dependency order. Tasks always run in this order.
pub const CATALOG_ORDER: [&str; 12] = [
    "colors",
    "themes",
    "part_categories",
    "parts",
    "sets",
    "minifigs",
    "part_relationships",
    "elements",
    "inventories",
    "inventory_parts",
    "inventory_sets",
    "inventory_minifigs",
];

/// Type key of the single task of an inventory job.
pub const INVENTORY_KEY: &str = "inventory";

/// Why the current task stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceReason {
    /// End of file reached normally.
    Eof,
    Skipped(SkipReason),
    /// Anything else; the task is marked `unknown_error`.
    Error(String),
}

/// Build the ordered task list for a job.
///
/// Returns the tasks and the keys that were dropped as unsupported or duplicated.
fn plan_tasks(kind: JobKind, files: &[(String, PathBuf)]) -> (Vec<Task>, Vec<String>) {
    let accepted: &[&str] = match kind {
        JobKind::CatalogImport => &CATALOG_ORDER,
        JobKind::InventoryImport => &[INVENTORY_KEY],
    };

    let mut tasks = Vec::new();
    for key in accepted {
        if let Some((_, path)) = files.iter().find(|(k, _)| k == key) {
            tasks.push(Task::new(*key, path.clone()));
        }
    }

    let mut dropped = Vec::new();
    for (i, (key, _)) in files.iter().enumerate() {
        let first = files.iter().position(|(k, _)| k == key) == Some(i);
        if !accepted.contains(&key.as_str()) || !first {
            dropped.push(key.clone());
        }
    }
    (tasks, dropped)
}

/// Create a pending job for the given `(type key, path)` files.
pub fn create_job(
    conn: &Connection,
    kind: JobKind,
    files: &[(String, PathBuf)],
    now: DateTime<Utc>,
    max_log_entries: usize,
) -> Result<JobId, QueueError> {
    let (tasks, dropped) = plan_tasks(kind, files);
    for key in &dropped {
        log::warn!("Ignoring unsupported or duplicate file key '{}'", key);
    }
    if tasks.is_empty() {
        return Err(QueueError::EmptyQueue);
    }

    let job_id = bricksberg_db::insert_job(conn, kind, &tasks, now)?;
    let log = JobLog::new(conn, job_id, max_log_entries, now);
    log.info(format!("Job created. {} file(s) queued.", tasks.len()));
    for key in &dropped {
        log.warn(format!("Ignored file key '{key}'"));
    }
    Ok(job_id)
}

/// Enqueue a Rebrickable catalog import and wake the scheduler.
pub fn submit_catalog_job(
    conn: &Connection,
    files: &[(String, PathBuf)],
    now: DateTime<Utc>,
    max_log_entries: usize,
) -> Result<JobId, QueueError> {
    let job_id = create_job(conn, JobKind::CatalogImport, files, now, max_log_entries)?;
    bricksberg_db::request_wake(conn, now)?;
    log::info!("Submitted catalog job {}", job_id);
    Ok(job_id)
}

/// Enqueue a BrickOwl inventory import and wake the scheduler.
///
/// Refuses to run until the catalog holds colors and parts to resolve against.
pub fn submit_inventory_job(
    conn: &Connection,
    path: impl Into<PathBuf>,
    now: DateTime<Utc>,
    max_log_entries: usize,
) -> Result<JobId, QueueError> {
    for (kind, file) in [(EntityKind::Color, "colors"), (EntityKind::Part, "parts")] {
        if bricksberg_db::count_entities(conn, kind)? == 0 {
            return Err(QueueError::MissingCatalogData(file.to_string()));
        }
    }

    let files = [(INVENTORY_KEY.to_string(), path.into())];
    let job_id = create_job(conn, JobKind::InventoryImport, &files, now, max_log_entries)?;
    bricksberg_db::request_wake(conn, now)?;
    log::info!("Submitted inventory job {}", job_id);
    Ok(job_id)
}

/// Close the current task and move the job to its next task.
///
/// Marks the job complete when no task is left.
pub fn advance(
    conn: &Connection,
    job: &mut Job,
    reason: AdvanceReason,
    log: &JobLog<'_>,
    now: DateTime<Utc>,
) -> Result<(), PipelineError> {
    let index = job.current_task_index;
    let job_id = job.id;
    let task = job
        .tasks
        .get_mut(index)
        .ok_or(PipelineError::InvalidTaskIndex { job_id, index })?;

    match &reason {
        AdvanceReason::Eof => {
            task.status = TaskStatus::Complete;
            if task.total_rows.is_none() {
                task.total_rows = Some(task.rows_processed.saturating_sub(1));
            }
        }
        AdvanceReason::Skipped(skip) => {
            task.status = TaskStatus::Skipped;
            task.total_rows = Some(task.rows_processed);
            log.warn(format!("Skipping task {}: {}", task.type_key, skip));
        }
        AdvanceReason::Error(message) => {
            task.status = TaskStatus::UnknownError;
            task.total_rows = Some(task.rows_processed);
            log.error(format!("Task {} stopped: {}", task.type_key, message));
        }
    }
    bricksberg_db::save_task(conn, job_id, index, task)?;

    let next = index + 1;
    if let Some(next_task) = job.tasks.get(next) {
        bricksberg_db::set_current_task_index(conn, job_id, next, now)?;
        log.info(format!("Starting next task {}", next_task.type_key));
        job.current_task_index = next;
    } else {
        bricksberg_db::transition_job_status(
            conn,
            job_id,
            JobStatus::Running,
            JobStatus::Complete,
            now,
        )?;
        job.status = JobStatus::Complete;
        log.info("Job complete");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(keys: &[&str]) -> Vec<(String, PathBuf)> {
        keys.iter()
            .map(|k| (k.to_string(), PathBuf::from(format!("/tmp/{k}.csv"))))
            .collect()
    }

    #[test]
    fn catalog_tasks_follow_dependency_order() {
        let (tasks, dropped) = plan_tasks(
            JobKind::CatalogImport,
            &files(&["inventory_sets", "sets", "colors", "bogus", "sets"]),
        );
        let keys: Vec<_> = tasks.iter().map(|t| t.type_key.as_str()).collect();
        assert_eq!(keys, ["colors", "sets", "inventory_sets"]);
        assert_eq!(dropped, ["bogus", "sets"]);
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Pending));
    }

    #[test]
    fn inventory_jobs_accept_only_the_inventory_key() {
        let (tasks, dropped) = plan_tasks(JobKind::InventoryImport, &files(&["colors", "inventory"]));
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].type_key, INVENTORY_KEY);
        assert_eq!(dropped, ["colors"]);
    }
}
