//! Read-only views of jobs for status displays.

use std::path::PathBuf;

use bricksberg_catalog::{JobId, JobKind, JobStatus, LogEntry, Task, TaskStatus};
use bricksberg_db::OperationError;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

/// Progress of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskProgress {
    pub type_key: String,
    pub file_name: String,
    pub source_path: PathBuf,
    pub status: TaskStatus,
    /// Lines consumed, header included.
    pub rows_processed: u64,
    pub total_rows: Option<u64>,
}

impl TaskProgress {
    fn from_task(task: &Task) -> Self {
        Self {
            type_key: task.type_key.clone(),
            file_name: task.file_name(),
            source_path: task.source_path.clone(),
            status: task.status,
            rows_processed: task.rows_processed,
            total_rows: task.total_rows,
        }
    }

    /// Data rows consumed, excluding the header.
    pub fn data_rows(&self) -> u64 {
        self.rows_processed.saturating_sub(1)
    }
}

/// A job with its task progress and most recent log entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub current_task_index: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub tasks: Vec<TaskProgress>,
    /// Oldest first.
    pub log_tail: Vec<LogEntry>,
}

impl JobSummary {
    pub fn current_task(&self) -> Option<&TaskProgress> {
        if self.status.is_terminal() {
            return None;
        }
        self.tasks.get(self.current_task_index)
    }

    /// Tasks that reached a final status.
    pub fn finished_tasks(&self) -> usize {
        self.tasks.iter().filter(|t| t.status.is_finished()).count()
    }
}

pub fn job_summary(
    conn: &Connection,
    job_id: JobId,
    log_lines: usize,
) -> Result<Option<JobSummary>, OperationError> {
    let Some(job) = bricksberg_db::load_job(conn, job_id)? else {
        return Ok(None);
    };
    let log_tail = bricksberg_db::job_log_tail(conn, job_id, log_lines)?;
    Ok(Some(JobSummary {
        id: job.id,
        kind: job.kind,
        status: job.status,
        current_task_index: job.current_task_index,
        created_at: job.created_at,
        last_activity: job.last_activity,
        tasks: job.tasks.iter().map(TaskProgress::from_task).collect(),
        log_tail,
    }))
}
