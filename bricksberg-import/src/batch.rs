//! One batch of one task: read up to N rows from the cursor and hand them to
//! the task's handler.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use bricksberg_catalog::{HeaderMap, Job, JobId, JobKind, Task, TaskStatus};
use bricksberg_db::SqliteEntityStore;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::cache::ResolutionCache;
use crate::cursor::{CsvCursor, CursorLine};
use crate::error::{PipelineError, SkipReason};
use crate::handlers::{HandlerContext, HandlerOptions, Row, RowHandler};
use crate::joblog::JobLog;
use crate::queue::{self, AdvanceReason};
use crate::registry::HandlerRegistry;

/// How much work one batch may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    /// Non-empty rows handed to the handler.
    pub batch_size: usize,
    /// Wall-clock budget; the batch stops early once it is spent.
    pub time_budget: Duration,
}

/// What a batch did to its task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Rows were processed and the file has more.
    Progress { type_key: String, rows_processed: u64 },
    /// The file was consumed and the task closed.
    TaskComplete { type_key: String, total_rows: u64 },
    TaskSkipped { type_key: String, reason: SkipReason },
}

/// Per-run state kept in memory between the batches of one job.
#[derive(Default)]
pub struct JobSession {
    job_id: Option<JobId>,
    cache: ResolutionCache,
    /// Handlers already started in this run, by type key.
    handlers: HashMap<String, Box<dyn RowHandler>>,
}

impl JobSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Job this session is running, if any.
    pub fn job_id(&self) -> Option<JobId> {
        self.job_id
    }

    /// Start a fresh run of `job_id`, dropping all per-run state.
    pub fn begin(&mut self, job_id: JobId) {
        self.cache.reset();
        self.handlers.clear();
        self.job_id = Some(job_id);
    }

    /// Forget the current run.
    pub fn end(&mut self) {
        self.cache.reset();
        self.handlers.clear();
        self.job_id = None;
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }
}

/// Runs batches against one connection.
pub struct BatchRunner<'a> {
    pub conn: &'a Connection,
    pub registry: &'a HandlerRegistry,
    pub handler_options: HandlerOptions,
    pub limits: BatchLimits,
    pub log: &'a JobLog<'a>,
    pub now: DateTime<Utc>,
}

impl BatchRunner<'_> {
    /// Process one batch of the job's current task inside a transaction.
    ///
    /// The source file of a completed task is deleted after the commit.
    pub fn run(
        &self,
        job: &mut Job,
        session: &mut JobSession,
    ) -> Result<BatchOutcome, PipelineError> {
        let tx = self.conn.unchecked_transaction()?;
        let (outcome, finished_file) = self.run_in_transaction(job, session)?;
        bricksberg_db::touch_job(self.conn, job.id, self.now)?;
        tx.commit()?;

        if let Some(path) = finished_file {
            match std::fs::remove_file(&path) {
                Ok(()) => log::debug!("Removed imported file {}", path.display()),
                Err(e) => log::warn!("Could not remove {}: {}", path.display(), e),
            }
        }
        Ok(outcome)
    }

    fn run_in_transaction(
        &self,
        job: &mut Job,
        session: &mut JobSession,
    ) -> Result<(BatchOutcome, Option<PathBuf>), PipelineError> {
        let index = job.current_task_index;
        let mut task = job
            .tasks
            .get(index)
            .cloned()
            .ok_or(PipelineError::InvalidTaskIndex { job_id: job.id, index })?;
        let store = SqliteEntityStore::new(self.conn);
        let JobSession { cache, handlers, .. } = session;

        let handler = match handlers.entry(task.type_key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let Some(mut built) = self.registry.build(&task.type_key, &self.handler_options)
                else {
                    return self.skip(job, task, SkipReason::HandlerMissing, None);
                };
                let mut ctx = HandlerContext {
                    job_id: job.id,
                    conn: self.conn,
                    store: &store,
                    cache: &mut *cache,
                    log: self.log,
                };
                built.start_job(&mut ctx)?;
                entry.insert(built)
            }
        };

        let mut cursor = match CsvCursor::open(&task.source_path) {
            Ok(cursor) => cursor,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return self.skip(job, task, SkipReason::FileNotFound, handler.relation());
            }
            Err(e) => return Err(e.into()),
        };

        let header = match task.header_map.clone() {
            Some(header) if task.rows_processed > 0 => {
                let skipped = cursor.skip_lines(task.rows_processed)?;
                if skipped < task.rows_processed {
                    return self.skip(job, task, SkipReason::EofDuringResume, handler.relation());
                }
                header
            }
            _ => {
                let header = match cursor.next_line()? {
                    Some(CursorLine::Record(record)) => {
                        HeaderMap::from_fields(record.iter(), handler.column_aliases())
                    }
                    _ => {
                        let relation = handler.relation();
                        return self.skip(job, task, SkipReason::HeaderUnreadable, relation);
                    }
                };
                let missing = header.missing(handler.required_columns());
                if !missing.is_empty() {
                    let missing = missing.into_iter().map(String::from).collect();
                    let reason = SkipReason::MissingColumns(missing);
                    return self.skip(job, task, reason, handler.relation());
                }
                task.header_map = Some(header.clone());
                task.rows_processed = 1;
                task.status = TaskStatus::Running;
                self.persist(job.id, index, &task)?;
                header
            }
        };
        task.status = TaskStatus::Running;

        let file_name = task.file_name();
        let started = Instant::now();
        let mut handled = 0;
        let mut eof = false;
        while handled < self.limits.batch_size {
            if handled > 0 && started.elapsed() >= self.limits.time_budget {
                log::debug!("Time budget spent after {} row(s)", handled);
                break;
            }
            let Some(line) = cursor.next_line()? else {
                eof = true;
                break;
            };
            task.rows_processed += 1;
            let line_no = task.rows_processed;

            let record = match line {
                CursorLine::Blank => continue,
                CursorLine::Malformed(msg) => {
                    self.log
                        .warn(format!("line {line_no} in {file_name}: unparseable row: {msg}"));
                    continue;
                }
                CursorLine::Record(record) => record,
            };
            handled += 1;

            let row = Row::new(&record, &header, line_no);
            let mut ctx = HandlerContext {
                job_id: job.id,
                conn: self.conn,
                store: &store,
                cache: &mut *cache,
                log: self.log,
            };
            match handler.process_row(&mut ctx, &row) {
                Ok(outcome) => log::debug!("line {} in {}: {:?}", line_no, file_name, outcome),
                Err(e) if e.is_warning() => {
                    self.log.warn(format!("line {line_no} in {file_name}: {e}"));
                }
                Err(e) => self.log.error(format!("line {line_no} in {file_name}: {e}")),
            }
        }
        if !eof {
            eof = cursor.at_eof()?;
        }

        let type_key = task.type_key.clone();
        if !eof {
            self.persist(job.id, index, &task)?;
            self.log.info(format!(
                "Task {}: batch finished, {} rows processed",
                type_key, task.rows_processed
            ));
            let rows_processed = task.rows_processed;
            job.tasks[index] = task;
            return Ok((BatchOutcome::Progress { type_key, rows_processed }, None));
        }

        let mut ctx = HandlerContext {
            job_id: job.id,
            conn: self.conn,
            store: &store,
            cache: &mut *cache,
            log: self.log,
        };
        handler.finish_job(&mut ctx)?;
        handlers.remove(&type_key);

        let total_rows = task.rows_processed.saturating_sub(1);
        task.total_rows = Some(total_rows);
        let stats = cache.stats();
        self.log.info(format!("Task {type_key} complete ({total_rows} rows)"));
        self.log.info(format!(
            "Lookup cache: {} hit(s), {} store quer(ies), {} miss(es)",
            stats.hits, stats.store_queries, stats.negative_entries
        ));

        let path = task.source_path.clone();
        job.tasks[index] = task;
        queue::advance(self.conn, job, AdvanceReason::Eof, self.log, self.now)?;
        Ok((BatchOutcome::TaskComplete { type_key, total_rows }, Some(path)))
    }

    /// Close the task as skipped, or fail the job when it has no other task.
    ///
    /// Lines staged under `relation` by this job are dropped with the task.
    fn skip(
        &self,
        job: &mut Job,
        task: Task,
        reason: SkipReason,
        relation: Option<&'static str>,
    ) -> Result<(BatchOutcome, Option<PathBuf>), PipelineError> {
        if let Some(relation) = relation {
            bricksberg_db::discard_staging(self.conn, job.id, relation)?;
        }
        if job.kind == JobKind::InventoryImport {
            return Err(PipelineError::TaskFailed {
                type_key: task.type_key,
                reason,
            });
        }
        let type_key = task.type_key.clone();
        let index = job.current_task_index;
        job.tasks[index] = task;
        queue::advance(
            self.conn,
            job,
            AdvanceReason::Skipped(reason.clone()),
            self.log,
            self.now,
        )?;
        Ok((BatchOutcome::TaskSkipped { type_key, reason }, None))
    }

    fn persist(&self, job_id: JobId, index: usize, task: &Task) -> Result<(), PipelineError> {
        if !bricksberg_db::save_task(self.conn, job_id, index, task)? {
            log::warn!("Job {} is no longer running; task progress not saved", job_id);
        }
        Ok(())
    }
}
