//! Error taxonomy of the import pipeline.
//!
//! Row errors stay inside the batch and are logged. Task problems are
//! expressed as a [`SkipReason`] and drive the queue. Everything else is a
//! [`PipelineError`] and fails the job.

use bricksberg_catalog::{JobId, StoreError};
use bricksberg_db::{OperationError, SchemaError};
use thiserror::Error;

/// A problem with a single CSV row. Never aborts the batch.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("invalid value for '{field}': '{value}'")]
    InvalidField { field: &'static str, value: String },
    #[error("{role} not found: {key}")]
    Unresolved { role: &'static str, key: String },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("database error: {0}")]
    Database(#[from] OperationError),
}

impl RowError {
    pub fn invalid(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            value: value.into(),
        }
    }

    pub fn unresolved(role: &'static str, key: impl Into<String>) -> Self {
        Self::Unresolved {
            role,
            key: key.into(),
        }
    }

    /// Unresolved references are expected when files arrive out of order.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Unresolved { .. })
    }
}

/// Why a task stopped without reaching the end of its file normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    FileNotFound,
    HeaderUnreadable,
    MissingColumns(Vec<String>),
    HandlerMissing,
    EofDuringResume,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileNotFound => "file_not_found",
            Self::HeaderUnreadable => "header_read_error",
            Self::MissingColumns(_) => "missing_columns",
            Self::HandlerMissing => "handler_not_found",
            Self::EofDuringResume => "eof_during_skip",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileNotFound => write!(f, "source file not found"),
            Self::HeaderUnreadable => write!(f, "header row could not be read"),
            Self::MissingColumns(cols) => {
                write!(f, "required columns missing: {}", cols.join(", "))
            }
            Self::HandlerMissing => write!(f, "no handler registered"),
            Self::EofDuringResume => write!(f, "end of file reached while seeking to resume point"),
        }
    }
}

/// A job-fatal failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("database error: {0}")]
    Database(#[from] OperationError),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("job {0} not found")]
    JobNotFound(JobId),
    #[error("job {job_id} has no task at index {index}")]
    InvalidTaskIndex { job_id: JobId, index: usize },
    #[error("task '{type_key}' cannot continue: {reason}")]
    TaskFailed { type_key: String, reason: SkipReason },
    #[error("batch panicked: {0}")]
    Panic(String),
}

/// Errors from job submission and operator actions.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("no supported files to import")]
    EmptyQueue,
    #[error("catalog data missing: import {0} first")]
    MissingCatalogData(String),
    #[error("job {0} not found")]
    JobNotFound(JobId),
    #[error("job {0} is running; cancel it first")]
    JobActive(JobId),
    #[error("database error: {0}")]
    Database(#[from] OperationError),
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
