use bricksberg_db::{OperationError, SchemaError};
use bricksberg_import::{PipelineError, QueueError, SettingsError};
use thiserror::Error;

/// Errors that can occur during CLI command execution.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    /// I/O error
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Database could not be opened or queried
    #[error("Database error: {0}")]
    Database(String),

    /// Job could not be queued, cancelled or deleted
    #[error("{0}")]
    Queue(#[from] QueueError),

    /// Scheduler tick could not record its outcome
    #[error("Scheduler error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] SettingsError),

    /// Runtime creation or async error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Bad command-line input
    #[error("{0}")]
    Usage(String),
}

impl CliError {
    pub(crate) fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub(crate) fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    pub(crate) fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }
}

impl From<OperationError> for CliError {
    fn from(e: OperationError) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<SchemaError> for CliError {
    fn from(e: SchemaError) -> Self {
        Self::Database(e.to_string())
    }
}
