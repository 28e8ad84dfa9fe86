//! The global scheduler lock and the wake flag.
//!
//! Both are single-row tables. The lock is acquired with a compare-and-set
//! update so that overlapping ticks in separate processes cannot both win.

use bricksberg_catalog::JobId;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use crate::operations::OperationError;
use crate::timestamp;

/// Current holder of the global lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolder {
    pub job_id: JobId,
    pub acquired_at: Option<DateTime<Utc>>,
}

/// Read the lock without changing it.
pub fn lock_holder(conn: &Connection) -> Result<Option<LockHolder>, OperationError> {
    let (job_id, acquired_at): (Option<JobId>, Option<String>) = conn.query_row(
        "SELECT job_id, acquired_at FROM scheduler_lock WHERE id = 1",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let Some(job_id) = job_id else {
        return Ok(None);
    };
    let acquired_at = acquired_at
        .map(|ts| timestamp::decode("scheduler_lock.acquired_at", &ts))
        .transpose()?;
    Ok(Some(LockHolder {
        job_id,
        acquired_at,
    }))
}

/// Take the lock for `job_id` if nobody holds it.
pub fn try_acquire_lock(
    conn: &Connection,
    job_id: JobId,
    now: DateTime<Utc>,
) -> Result<bool, OperationError> {
    let changed = conn.execute(
        "UPDATE scheduler_lock SET job_id = ?1, acquired_at = ?2
         WHERE id = 1 AND job_id IS NULL",
        params![job_id, timestamp::encode(now)],
    )?;
    Ok(changed > 0)
}

/// Release the lock, but only if it still names `job_id`.
pub fn release_lock(conn: &Connection, job_id: JobId) -> Result<bool, OperationError> {
    let changed = conn.execute(
        "UPDATE scheduler_lock SET job_id = NULL, acquired_at = NULL
         WHERE id = 1 AND job_id = ?1",
        params![job_id],
    )?;
    Ok(changed > 0)
}

/// Ask a running scheduler loop to tick early.
pub fn request_wake(conn: &Connection, now: DateTime<Utc>) -> Result<(), OperationError> {
    conn.execute(
        "UPDATE scheduler_wake SET requested_at = ?1 WHERE id = 1",
        params![timestamp::encode(now)],
    )?;
    Ok(())
}

/// Consume a pending wake request. Returns true if one was pending.
pub fn take_wake_request(conn: &Connection) -> Result<bool, OperationError> {
    let changed = conn.execute(
        "UPDATE scheduler_wake SET requested_at = NULL WHERE id = 1 AND requested_at IS NOT NULL",
        [],
    )?;
    Ok(changed > 0)
}
