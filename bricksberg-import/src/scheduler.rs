//! The scheduler tick: the only entry point that performs import work.
//!
//! Each tick recovers a stale lock if needed, picks one job, takes the
//! global lock for it and runs exactly one batch of its current task.

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use bricksberg_catalog::{JobId, JobKind, JobStatus};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::batch::{BatchLimits, BatchOutcome, BatchRunner, JobSession};
use crate::control;
use crate::error::PipelineError;
use crate::handlers::HandlerOptions;
use crate::joblog::JobLog;
use crate::registry::HandlerRegistry;
use crate::settings::{RelationStrategy, Settings};

/// Tunables for the tick, normally derived from [`Settings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub catalog_batch_size: usize,
    pub inventory_batch_size: usize,
    pub job_timeout: Duration,
    pub batch_time_budget: Duration,
    pub max_log_entries: usize,
    pub relation_strategy: RelationStrategy,
}

impl SchedulerOptions {
    /// Options with batch size floors applied.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            catalog_batch_size: settings.effective_catalog_batch_size(),
            inventory_batch_size: settings.effective_inventory_batch_size(),
            job_timeout: settings.job_timeout(),
            batch_time_budget: settings.batch_time_budget(),
            max_log_entries: settings.max_log_entries,
            relation_strategy: settings.relationship_strategy,
        }
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// What a tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Job force-failed because its lock timed out.
    pub recovered: Option<JobId>,
    pub outcome: TickOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No pending or running job.
    Idle,
    /// Another tick holds a live lock.
    Busy { job_id: JobId },
    Worked {
        job_id: JobId,
        status: JobStatus,
        batch: BatchOutcome,
    },
    /// The job was abandoned because it is no longer running.
    Abandoned { job_id: JobId },
    Failed { job_id: JobId, reason: String },
}

enum LockState {
    Free { recovered: Option<JobId> },
    Busy(JobId),
}

/// Releases the global lock on drop, if it still names this job.
struct LockGuard<'a> {
    conn: &'a Connection,
    job_id: JobId,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        match bricksberg_db::release_lock(self.conn, self.job_id) {
            Ok(true) => {}
            Ok(false) => log::debug!("Lock for job {} already released", self.job_id),
            Err(e) => log::error!("Could not release lock for job {}: {}", self.job_id, e),
        }
    }
}

pub struct Scheduler {
    conn: Connection,
    registry: HandlerRegistry,
    options: SchedulerOptions,
    session: JobSession,
}

impl Scheduler {
    pub fn new(conn: Connection, options: SchedulerOptions) -> Self {
        Self::with_registry(conn, HandlerRegistry::with_defaults(), options)
    }

    pub fn with_registry(
        conn: Connection,
        registry: HandlerRegistry,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            conn,
            registry,
            options,
            session: JobSession::new(),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Drop the scheduler and hand back its connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    pub fn tick(&mut self) -> Result<TickReport, PipelineError> {
        self.tick_with_clock(Utc::now)
    }

    /// Run one tick with the clock frozen at `now`.
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> Result<TickReport, PipelineError> {
        self.tick_with_clock(|| now)
    }

    /// Run one tick, reading `clock` when the tick starts and again once the
    /// batch is done.
    ///
    /// Errors are returned only when the database cannot record the outcome;
    /// batch failures fail the job and are reported as [`TickOutcome::Failed`].
    pub fn tick_with_clock(
        &mut self,
        clock: impl Fn() -> DateTime<Utc>,
    ) -> Result<TickReport, PipelineError> {
        let now = clock();
        let conn = &self.conn;
        let registry = &self.registry;
        let options = &self.options;
        let session = &mut self.session;

        let recovered = match recover_lock(conn, options, now)? {
            LockState::Busy(job_id) => {
                log::debug!("Job {} holds the scheduler lock", job_id);
                return Ok(TickReport {
                    recovered: None,
                    outcome: TickOutcome::Busy { job_id },
                });
            }
            LockState::Free { recovered } => recovered,
        };
        if recovered.is_some() && session.job_id() == recovered {
            session.end();
        }
        let report = |outcome| TickReport { recovered, outcome };

        let Some(job_id) = bricksberg_db::next_runnable_job(conn)? else {
            return Ok(report(TickOutcome::Idle));
        };
        if !bricksberg_db::try_acquire_lock(conn, job_id, now)? {
            let holder = bricksberg_db::lock_holder(conn)?.map_or(job_id, |h| h.job_id);
            return Ok(report(TickOutcome::Busy { job_id: holder }));
        }
        let _guard = LockGuard { conn, job_id };

        let log = JobLog::new(conn, job_id, options.max_log_entries, now);
        let fresh_run = session.job_id() != Some(job_id);
        if bricksberg_db::transition_job_status(
            conn,
            job_id,
            JobStatus::Pending,
            JobStatus::Running,
            now,
        )? {
            log.info("Job started");
        } else if fresh_run {
            log.info("Job resumed");
        }
        bricksberg_db::touch_job(conn, job_id, now)?;
        if fresh_run {
            session.begin(job_id);
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            run_job_batch(conn, registry, options, session, &log, job_id, now)
        }))
        .unwrap_or_else(|payload| Err(PipelineError::Panic(panic_message(payload.as_ref()))));

        let finished = clock();
        let outcome = match result {
            Ok(Some((status, batch))) => {
                bricksberg_db::touch_job(conn, job_id, finished)?;
                if status.is_terminal() {
                    session.end();
                }
                TickOutcome::Worked {
                    job_id,
                    status,
                    batch,
                }
            }
            Ok(None) => {
                session.end();
                TickOutcome::Abandoned { job_id }
            }
            Err(e) => {
                session.end();
                let reason = e.to_string();
                control::fail_job(conn, job_id, &reason, options.max_log_entries, finished)?;
                TickOutcome::Failed { job_id, reason }
            }
        };
        Ok(report(outcome))
    }
}

/// Clear a lock whose job is gone, finished or timed out.
fn recover_lock(
    conn: &Connection,
    options: &SchedulerOptions,
    now: DateTime<Utc>,
) -> Result<LockState, PipelineError> {
    let Some(holder) = bricksberg_db::lock_holder(conn)? else {
        return Ok(LockState::Free { recovered: None });
    };

    match bricksberg_db::job_activity(conn, holder.job_id)? {
        Some((JobStatus::Running, last_activity)) => {
            let idle = now.signed_duration_since(last_activity);
            let timed_out = chrono::Duration::from_std(options.job_timeout)
                .is_ok_and(|timeout| idle > timeout);
            if !timed_out {
                return Ok(LockState::Busy(holder.job_id));
            }
            let reason = format!(
                "Job timed out: no activity for {}s (limit {}s)",
                idle.num_seconds(),
                options.job_timeout.as_secs()
            );
            control::fail_job(conn, holder.job_id, &reason, options.max_log_entries, now)?;
            log::warn!("Recovered scheduler lock from job {}", holder.job_id);
            Ok(LockState::Free {
                recovered: Some(holder.job_id),
            })
        }
        _ => {
            log::warn!(
                "Releasing scheduler lock held by inactive job {}",
                holder.job_id
            );
            bricksberg_db::release_lock(conn, holder.job_id)?;
            Ok(LockState::Free { recovered: None })
        }
    }
}

/// Load the job and run one batch. `None` means the job is no longer running.
fn run_job_batch(
    conn: &Connection,
    registry: &HandlerRegistry,
    options: &SchedulerOptions,
    session: &mut JobSession,
    log: &JobLog<'_>,
    job_id: JobId,
    now: DateTime<Utc>,
) -> Result<Option<(JobStatus, BatchOutcome)>, PipelineError> {
    let mut job =
        bricksberg_db::load_job(conn, job_id)?.ok_or(PipelineError::JobNotFound(job_id))?;
    if job.status != JobStatus::Running {
        return Ok(None);
    }

    let batch_size = match job.kind {
        JobKind::CatalogImport => options.catalog_batch_size,
        JobKind::InventoryImport => options.inventory_batch_size,
    };
    let runner = BatchRunner {
        conn,
        registry,
        handler_options: HandlerOptions {
            relation_strategy: options.relation_strategy,
        },
        limits: BatchLimits {
            batch_size,
            time_budget: options.batch_time_budget,
        },
        log,
        now,
    };
    let batch = runner.run(&mut job, session)?;
    Ok(Some((job.status, batch)))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
