//! Resumable batch import of Rebrickable catalog and BrickOwl inventory CSVs.
//!
//! Work is queued as jobs of ordered tasks, one per file. A scheduler tick
//! runs one batch of the current task and persists the cursor, so an import
//! survives restarts and spreads over as many ticks as it needs.

pub mod batch;
pub mod cache;
pub mod control;
pub mod cursor;
pub mod error;
pub mod handlers;
pub mod inspect;
pub mod joblog;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod settings;

pub use batch::{BatchLimits, BatchOutcome, BatchRunner, JobSession};
pub use cache::{CacheStats, ResolutionCache};
pub use control::{cancel_job, delete_job, fail_job};
pub use cursor::{CsvCursor, CursorLine};
pub use error::{PipelineError, QueueError, RowError, SkipReason};
pub use handlers::{HandlerContext, HandlerOptions, Row, RowHandler, RowOutcome};
pub use inspect::{JobSummary, TaskProgress, job_summary};
pub use joblog::JobLog;
pub use queue::{
    AdvanceReason, CATALOG_ORDER, INVENTORY_KEY, advance, create_job, submit_catalog_job,
    submit_inventory_job,
};
pub use registry::{HandlerFactory, HandlerRegistry};
pub use scheduler::{Scheduler, SchedulerOptions, TickOutcome, TickReport};
pub use settings::{RelationStrategy, SettingSource, Settings, SettingsError};
