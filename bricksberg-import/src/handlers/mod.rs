//! Row handlers: one per CSV type key.
//!
//! A handler turns one parsed row into entity upserts and relationship lines.
//! Handlers are built once per job run by the [`HandlerRegistry`] and keep
//! only per-run state; anything that must survive a restart lives in the
//! database.
//!
//! [`HandlerRegistry`]: crate::registry::HandlerRegistry

mod catalog;
mod inventory;
mod relation_writer;
mod relationships;

pub use catalog::{
    ColorsHandler, MinifigsHandler, PartCategoriesHandler, PartsHandler, SetsHandler,
    ThemesHandler,
};
pub use inventory::InventoryHandler;
pub use relation_writer::RelationWriter;
pub use relationships::{
    ElementsHandler, InventoriesHandler, InventoryMinifigsHandler, InventoryPartsHandler,
    InventorySetsHandler, PartRelationshipsHandler,
};

use std::str::FromStr;

use bricksberg_catalog::{EntityId, EntityStore, HeaderMap, JobId};
use csv::StringRecord;
use rusqlite::Connection;

use crate::cache::ResolutionCache;
use crate::error::{PipelineError, RowError};
use crate::joblog::JobLog;
use crate::settings::RelationStrategy;

/// What a handler did with a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// An entity record was created or updated.
    Upserted(EntityId),
    /// A relationship line was written or staged.
    Linked,
    /// The row was valid but changed nothing.
    Unchanged,
}

/// Options shared by all handlers of a job run.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandlerOptions {
    pub relation_strategy: RelationStrategy,
}

/// Everything a handler may touch while processing rows.
pub struct HandlerContext<'a> {
    pub job_id: JobId,
    /// Pipeline database, for relationship staging.
    pub conn: &'a Connection,
    pub store: &'a dyn EntityStore,
    pub cache: &'a mut ResolutionCache,
    pub log: &'a JobLog<'a>,
}

/// Interprets rows of one CSV schema.
pub trait RowHandler: Send {
    fn type_key(&self) -> &'static str;

    /// Columns that must be present in the header for the task to run.
    fn required_columns(&self) -> &'static [&'static str];

    /// Relation key this handler writes lines under, if any.
    fn relation(&self) -> Option<&'static str> {
        None
    }

    /// `(alias, canonical)` header names folded when the header is read.
    fn column_aliases(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Called once before the first row of a job run.
    fn start_job(&mut self, _ctx: &mut HandlerContext<'_>) -> Result<(), PipelineError> {
        Ok(())
    }

    fn process_row(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        row: &Row<'_>,
    ) -> Result<RowOutcome, RowError>;

    /// Called once after the last row of the task's file.
    fn finish_job(&mut self, _ctx: &mut HandlerContext<'_>) -> Result<(), PipelineError> {
        Ok(())
    }
}

// ── Row ─────────────────────────────────────────────────────────────────────

/// A CSV record addressed by header column names.
pub struct Row<'r> {
    record: &'r StringRecord,
    header: &'r HeaderMap,
    line: u64,
}

impl<'r> Row<'r> {
    pub fn new(record: &'r StringRecord, header: &'r HeaderMap, line: u64) -> Self {
        Self {
            record,
            header,
            line,
        }
    }

    /// 1-based line number in the source file.
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Trimmed value of a column; `None` if the column is absent or empty.
    pub fn get(&self, column: &str) -> Option<&'r str> {
        let index = self.header.index_of(column)?;
        self.record
            .get(index)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn require(&self, column: &'static str) -> Result<&'r str, RowError> {
        self.get(column).ok_or(RowError::MissingField(column))
    }

    pub fn parse<T: FromStr>(&self, column: &'static str) -> Result<Option<T>, RowError> {
        match self.get(column) {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| RowError::invalid(column, raw)),
            None => Ok(None),
        }
    }

    pub fn require_parsed<T: FromStr>(&self, column: &'static str) -> Result<T, RowError> {
        let raw = self.require(column)?;
        raw.parse().map_err(|_| RowError::invalid(column, raw))
    }

    /// Boolean column in Rebrickable style (`t`/`f`), also accepting `true`/`1`/`yes`.
    pub fn flag(&self, column: &str) -> bool {
        matches!(
            self.get(column).map(str::to_lowercase).as_deref(),
            Some("t" | "true" | "1" | "yes" | "y")
        )
    }

    /// A strictly positive quantity.
    pub fn quantity(&self, column: &'static str) -> Result<u32, RowError> {
        let raw = self.require(column)?;
        match raw.parse::<u32>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(RowError::invalid(column, raw)),
        }
    }
}
