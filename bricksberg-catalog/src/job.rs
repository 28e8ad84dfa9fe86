//! Import job and task model.
//!
//! A job is an ordered queue of tasks, one per source file. Both are persisted
//! between scheduler ticks; the cursor of a task is its `rows_processed` count
//! plus the header map read from the first line of the file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a persisted import job.
pub type JobId = i64;

// ── Job Kind / Status ───────────────────────────────────────────────────────

/// Which batch processor a job is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    CatalogImport,
    InventoryImport,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CatalogImport => "catalog_import",
            Self::InventoryImport => "inventory_import",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "catalog_import" | "catalog" => Some(Self::CatalogImport),
            "inventory_import" | "inventory" => Some(Self::InventoryImport),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "complete" | "completed" => Some(Self::Complete),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Complete and failed jobs accept nothing but log appends.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Complete,
    Skipped,
    UnknownError,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Skipped => "skipped",
            Self::UnknownError => "unknown_error",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "complete" | "completed" => Some(Self::Complete),
            "skipped" => Some(Self::Skipped),
            "unknown_error" => Some(Self::UnknownError),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Complete | Self::Skipped | Self::UnknownError)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Header Map ──────────────────────────────────────────────────────────────

/// Column name to column index, derived from a file's header row.
///
/// Names are trimmed and lowercased. Aliases are folded into their canonical
/// name; when both an alias and its canonical column exist, the first one in
/// the file wins.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderMap {
    columns: BTreeMap<String, usize>,
}

impl HeaderMap {
    /// Build a header map from raw header fields.
    ///
    /// `aliases` is a list of `(alias, canonical)` pairs.
    pub fn from_fields<'a>(
        fields: impl IntoIterator<Item = &'a str>,
        aliases: &[(&str, &str)],
    ) -> Self {
        let mut columns = BTreeMap::new();
        for (index, raw) in fields.into_iter().enumerate() {
            let name = normalize_column(raw);
            if name.is_empty() {
                continue;
            }
            let canonical = aliases
                .iter()
                .find(|(alias, _)| *alias == name)
                .map(|(_, canonical)| canonical.to_string())
                .unwrap_or(name);
            columns.entry(canonical).or_insert(index);
        }
        Self { columns }
    }

    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.get(column).copied()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Required columns absent from this header, in the order given.
    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|c| !self.contains(c))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, usize)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

fn normalize_column(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_lowercase()
}

// ── Task ────────────────────────────────────────────────────────────────────

/// One source file's processing state within a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub type_key: String,
    pub source_path: PathBuf,
    pub status: TaskStatus,
    /// Lines consumed so far, header included.
    pub rows_processed: u64,
    /// Data rows in the file; known once EOF was reached or the task was skipped.
    pub total_rows: Option<u64>,
    pub header_map: Option<HeaderMap>,
}

impl Task {
    pub fn new(type_key: impl Into<String>, source_path: impl Into<PathBuf>) -> Self {
        Self {
            type_key: type_key.into(),
            source_path: source_path.into(),
            status: TaskStatus::Pending,
            rows_processed: 0,
            total_rows: None,
            header_map: None,
        }
    }

    /// File name of the source, for log messages.
    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source_path.display().to_string())
    }
}

// ── Job ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub tasks: Vec<Task>,
    pub current_task_index: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Job {
    pub fn current_task(&self) -> Option<&Task> {
        self.tasks.get(self.current_task_index)
    }
}

/// One timestamped line of a job's log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub logged_at: DateTime<Utc>,
    pub message: String,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.logged_at.format("%H:%M:%S"), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_map_normalizes_names() {
        let map = HeaderMap::from_fields(["\u{feff}ID", " Name ", "RGB", ""], &[]);
        assert_eq!(map.index_of("id"), Some(0));
        assert_eq!(map.index_of("name"), Some(1));
        assert_eq!(map.index_of("rgb"), Some(2));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn header_map_folds_aliases() {
        let aliases = [("qty", "quantity"), ("color", "color_name")];
        let map = HeaderMap::from_fields(["BOID", "Color", "Qty"], &aliases);
        assert_eq!(map.index_of("color_name"), Some(1));
        assert_eq!(map.index_of("quantity"), Some(2));
        assert!(!map.contains("qty"));
    }

    #[test]
    fn header_map_first_column_wins() {
        let aliases = [("qty", "quantity")];
        let map = HeaderMap::from_fields(["quantity", "qty"], &aliases);
        assert_eq!(map.index_of("quantity"), Some(0));
    }

    #[test]
    fn header_map_reports_missing_columns() {
        let map = HeaderMap::from_fields(["boid", "price"], &[]);
        assert_eq!(
            map.missing(&["boid", "color_name", "price", "quantity"]),
            vec!["color_name", "quantity"]
        );
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Complete,
            TaskStatus::Skipped,
            TaskStatus::UnknownError,
        ] {
            assert_eq!(TaskStatus::from_str_loose(status.as_str()), Some(status));
        }
        assert_eq!(JobKind::from_str_loose("bogus"), None);
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }
}
