//! Job log writer.
//!
//! Every entry goes to the job's persisted log (capped, oldest dropped) and is
//! mirrored to the `log` facade at the matching level.

use bricksberg_catalog::JobId;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

pub struct JobLog<'a> {
    conn: &'a Connection,
    job_id: JobId,
    max_entries: usize,
    now: DateTime<Utc>,
}

impl<'a> JobLog<'a> {
    pub fn new(
        conn: &'a Connection,
        job_id: JobId,
        max_entries: usize,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            conn,
            job_id,
            max_entries,
            now,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        log::info!("[job {}] {}", self.job_id, message);
        self.append(message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        log::warn!("[job {}] {}", self.job_id, message);
        self.append(&format!("WARNING: {message}"));
    }

    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        log::error!("[job {}] {}", self.job_id, message);
        self.append(&format!("ERROR: {message}"));
    }

    fn append(&self, message: &str) {
        let appended =
            bricksberg_db::append_job_log(self.conn, self.job_id, message, self.now, self.max_entries);
        if let Err(e) = appended {
            log::warn!("Could not write job log for job {}: {}", self.job_id, e);
        }
    }
}
