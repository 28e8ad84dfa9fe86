//! Persistence for import jobs, their task queues, and job logs.

use std::path::PathBuf;

use bricksberg_catalog::{HeaderMap, Job, JobId, JobKind, JobStatus, LogEntry, Task, TaskStatus};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::operations::OperationError;
use crate::timestamp;

/// A job as shown in listings, without its tasks.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: JobId,
    pub kind: String,
    pub status: String,
    pub current_task_index: usize,
    pub task_count: usize,
    pub created_at: String,
    pub last_activity: String,
}

// ── Job Operations ──────────────────────────────────────────────────────────

/// Insert a pending job with its task queue. Returns the new job id.
pub fn insert_job(
    conn: &Connection,
    kind: JobKind,
    tasks: &[Task],
    now: DateTime<Utc>,
) -> Result<JobId, OperationError> {
    let tx = conn.unchecked_transaction()?;
    let ts = timestamp::encode(now);
    tx.execute(
        "INSERT INTO jobs (kind, status, current_task_index, created_at, last_activity)
         VALUES (?1, ?2, 0, ?3, ?3)",
        params![kind.as_str(), JobStatus::Pending.as_str(), ts],
    )?;
    let job_id = tx.last_insert_rowid();

    for (position, task) in tasks.iter().enumerate() {
        tx.execute(
            "INSERT INTO tasks (job_id, position, type_key, source_path, status, rows_processed, total_rows, header_map)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                job_id,
                position as i64,
                task.type_key,
                task.source_path.to_string_lossy(),
                task.status.as_str(),
                task.rows_processed as i64,
                task.total_rows.map(|n| n as i64),
                encode_header(task.header_map.as_ref())?,
            ],
        )?;
    }

    tx.commit()?;
    Ok(job_id)
}

/// Load a job with its full task queue.
pub fn load_job(conn: &Connection, job_id: JobId) -> Result<Option<Job>, OperationError> {
    let head = conn
        .query_row(
            "SELECT kind, status, current_task_index, created_at, last_activity
             FROM jobs WHERE id = ?1",
            params![job_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;
    let Some((kind, status, current_task_index, created_at, last_activity)) = head else {
        return Ok(None);
    };

    let kind =
        JobKind::from_str_loose(&kind).ok_or_else(|| OperationError::invalid("jobs.kind", kind))?;
    let status = parse_job_status(&status)?;

    Ok(Some(Job {
        id: job_id,
        kind,
        status,
        tasks: load_tasks(conn, job_id)?,
        current_task_index: current_task_index.max(0) as usize,
        created_at: timestamp::decode("jobs.created_at", &created_at)?,
        last_activity: timestamp::decode("jobs.last_activity", &last_activity)?,
    }))
}

/// Status and last activity of a job, without loading its tasks.
pub fn job_activity(
    conn: &Connection,
    job_id: JobId,
) -> Result<Option<(JobStatus, DateTime<Utc>)>, OperationError> {
    let row = conn
        .query_row(
            "SELECT status, last_activity FROM jobs WHERE id = ?1",
            params![job_id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;
    match row {
        Some((status, last_activity)) => Ok(Some((
            parse_job_status(&status)?,
            timestamp::decode("jobs.last_activity", &last_activity)?,
        ))),
        None => Ok(None),
    }
}

pub fn job_status(conn: &Connection, job_id: JobId) -> Result<Option<JobStatus>, OperationError> {
    Ok(job_activity(conn, job_id)?.map(|(status, _)| status))
}

/// Move a job from one status to another. Returns false if it was not in `from`.
pub fn transition_job_status(
    conn: &Connection,
    job_id: JobId,
    from: JobStatus,
    to: JobStatus,
    now: DateTime<Utc>,
) -> Result<bool, OperationError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = ?3, last_activity = ?4 WHERE id = ?1 AND status = ?2",
        params![job_id, from.as_str(), to.as_str(), timestamp::encode(now)],
    )?;
    Ok(changed > 0)
}

/// Mark a job failed unless it already finished. Returns true if it changed.
pub fn fail_job_status(
    conn: &Connection,
    job_id: JobId,
    now: DateTime<Utc>,
) -> Result<bool, OperationError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = 'failed', last_activity = ?2
         WHERE id = ?1 AND status IN ('pending', 'running')",
        params![job_id, timestamp::encode(now)],
    )?;
    Ok(changed > 0)
}

/// Refresh `last_activity` of a running job.
pub fn touch_job(conn: &Connection, job_id: JobId, now: DateTime<Utc>) -> Result<(), OperationError> {
    conn.execute(
        "UPDATE jobs SET last_activity = ?2 WHERE id = ?1 AND status = 'running'",
        params![job_id, timestamp::encode(now)],
    )?;
    Ok(())
}

/// Point a running job at another task.
pub fn set_current_task_index(
    conn: &Connection,
    job_id: JobId,
    index: usize,
    now: DateTime<Utc>,
) -> Result<(), OperationError> {
    conn.execute(
        "UPDATE jobs SET current_task_index = ?2, last_activity = ?3
         WHERE id = ?1 AND status = 'running'",
        params![job_id, index as i64, timestamp::encode(now)],
    )?;
    Ok(())
}

/// Pick the job the scheduler should work on next.
///
/// Running jobs come first (oldest activity first) so interrupted work
/// resumes; otherwise the oldest pending job.
pub fn next_runnable_job(conn: &Connection) -> Result<Option<JobId>, OperationError> {
    let running = conn
        .query_row(
            "SELECT id FROM jobs WHERE status = 'running'
             ORDER BY last_activity ASC, id ASC LIMIT 1",
            [],
            |row| row.get::<_, JobId>(0),
        )
        .optional()?;
    if running.is_some() {
        return Ok(running);
    }
    Ok(conn
        .query_row(
            "SELECT id FROM jobs WHERE status = 'pending'
             ORDER BY created_at ASC, id ASC LIMIT 1",
            [],
            |row| row.get::<_, JobId>(0),
        )
        .optional()?)
}

/// List jobs, newest first, optionally filtered by status.
pub fn list_jobs(
    conn: &Connection,
    status: Option<JobStatus>,
) -> Result<Vec<JobRow>, OperationError> {
    let mut stmt = conn.prepare(
        "SELECT j.id, j.kind, j.status, j.current_task_index, j.created_at, j.last_activity,
                (SELECT COUNT(*) FROM tasks t WHERE t.job_id = j.id)
         FROM jobs j
         WHERE ?1 IS NULL OR j.status = ?1
         ORDER BY j.id DESC",
    )?;
    let rows = stmt
        .query_map(params![status.map(|s| s.as_str())], |row| {
            Ok(JobRow {
                id: row.get(0)?,
                kind: row.get(1)?,
                status: row.get(2)?,
                current_task_index: row.get::<_, i64>(3)?.max(0) as usize,
                created_at: row.get(4)?,
                last_activity: row.get(5)?,
                task_count: row.get::<_, i64>(6)?.max(0) as usize,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Delete a job with its tasks, log and staged relationship lines.
pub fn delete_job(conn: &Connection, job_id: JobId) -> Result<bool, OperationError> {
    let changed = conn.execute("DELETE FROM jobs WHERE id = ?1", params![job_id])?;
    Ok(changed > 0)
}

fn parse_job_status(s: &str) -> Result<JobStatus, OperationError> {
    JobStatus::from_str_loose(s).ok_or_else(|| OperationError::invalid("jobs.status", s))
}

// ── Task Operations ─────────────────────────────────────────────────────────

fn load_tasks(conn: &Connection, job_id: JobId) -> Result<Vec<Task>, OperationError> {
    let mut stmt = conn.prepare_cached(
        "SELECT type_key, source_path, status, rows_processed, total_rows, header_map
         FROM tasks WHERE job_id = ?1 ORDER BY position",
    )?;
    let raw = stmt
        .query_map(params![job_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<i64>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(
            |(type_key, source_path, status, rows_processed, total_rows, header_map)| -> Result<Task, OperationError> {
                Ok(Task {
                    type_key,
                    source_path: PathBuf::from(source_path),
                    status: TaskStatus::from_str_loose(&status)
                        .ok_or_else(|| OperationError::invalid("tasks.status", status))?,
                    rows_processed: rows_processed.max(0) as u64,
                    total_rows: total_rows.map(|n| n.max(0) as u64),
                    header_map: header_map
                        .map(|json| serde_json::from_str::<HeaderMap>(&json))
                        .transpose()?,
                })
            },
        )
        .collect()
}

/// Persist a task's cursor and status.
///
/// Only written while the owning job is still running, so a job cancelled
/// mid-batch keeps the cursor it had when it was cancelled. Returns false if
/// nothing was written.
pub fn save_task(
    conn: &Connection,
    job_id: JobId,
    position: usize,
    task: &Task,
) -> Result<bool, OperationError> {
    let changed = conn.execute(
        "UPDATE tasks SET status = ?3, rows_processed = ?4, total_rows = ?5, header_map = ?6
         WHERE job_id = ?1 AND position = ?2
           AND (SELECT status FROM jobs WHERE id = ?1) = 'running'",
        params![
            job_id,
            position as i64,
            task.status.as_str(),
            task.rows_processed as i64,
            task.total_rows.map(|n| n as i64),
            encode_header(task.header_map.as_ref())?,
        ],
    )?;
    Ok(changed > 0)
}

fn encode_header(header: Option<&HeaderMap>) -> Result<Option<String>, OperationError> {
    Ok(header.map(serde_json::to_string).transpose()?)
}

// ── Job Log ─────────────────────────────────────────────────────────────────

/// Append a log line, then drop the oldest lines beyond `max_entries`.
pub fn append_job_log(
    conn: &Connection,
    job_id: JobId,
    message: &str,
    now: DateTime<Utc>,
    max_entries: usize,
) -> Result<(), OperationError> {
    conn.execute(
        "INSERT INTO job_log (job_id, logged_at, message) VALUES (?1, ?2, ?3)",
        params![job_id, timestamp::encode(now), message],
    )?;
    conn.execute(
        "DELETE FROM job_log WHERE job_id = ?1 AND id NOT IN (
             SELECT id FROM job_log WHERE job_id = ?1 ORDER BY id DESC LIMIT ?2
         )",
        params![job_id, max_entries.max(1) as i64],
    )?;
    Ok(())
}

/// The most recent `limit` log lines of a job, oldest first.
pub fn job_log_tail(
    conn: &Connection,
    job_id: JobId,
    limit: usize,
) -> Result<Vec<LogEntry>, OperationError> {
    let mut stmt = conn.prepare_cached(
        "SELECT logged_at, message FROM (
             SELECT id, logged_at, message FROM job_log
             WHERE job_id = ?1 ORDER BY id DESC LIMIT ?2
         ) ORDER BY id ASC",
    )?;
    let raw = stmt
        .query_map(params![job_id, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    raw.into_iter()
        .map(|(logged_at, message)| -> Result<LogEntry, OperationError> {
            Ok(LogEntry {
                logged_at: timestamp::decode("job_log.logged_at", &logged_at)?,
                message,
            })
        })
        .collect()
}
