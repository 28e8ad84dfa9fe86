//! Operator actions on jobs.

use bricksberg_catalog::{JobId, JobStatus};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::QueueError;
use crate::joblog::JobLog;
use bricksberg_db::OperationError;

/// Force a pending or running job to `failed` and log the cause.
///
/// Releases the scheduler lock if it names the job. Returns false when the
/// job was already terminal.
pub fn fail_job(
    conn: &Connection,
    job_id: JobId,
    reason: &str,
    max_log_entries: usize,
    now: DateTime<Utc>,
) -> Result<bool, OperationError> {
    if !bricksberg_db::fail_job_status(conn, job_id, now)? {
        return Ok(false);
    }
    JobLog::new(conn, job_id, max_log_entries, now).error(reason);
    bricksberg_db::release_lock(conn, job_id)?;
    Ok(true)
}

/// Stop a job on operator request. The next tick abandons it.
pub fn cancel_job(
    conn: &Connection,
    job_id: JobId,
    max_log_entries: usize,
    now: DateTime<Utc>,
) -> Result<bool, QueueError> {
    if bricksberg_db::job_status(conn, job_id)?.is_none() {
        return Err(QueueError::JobNotFound(job_id));
    }
    if !bricksberg_db::fail_job_status(conn, job_id, now)? {
        return Ok(false);
    }
    JobLog::new(conn, job_id, max_log_entries, now).warn("Cancelled by operator");
    bricksberg_db::release_lock(conn, job_id)?;
    Ok(true)
}

/// Remove a job with its tasks, log and staged lines.
pub fn delete_job(conn: &Connection, job_id: JobId) -> Result<(), QueueError> {
    match bricksberg_db::job_status(conn, job_id)? {
        None => Err(QueueError::JobNotFound(job_id)),
        Some(JobStatus::Running) => Err(QueueError::JobActive(job_id)),
        Some(_) => {
            bricksberg_db::delete_job(conn, job_id)?;
            log::info!("Deleted job {}", job_id);
            Ok(())
        }
    }
}
