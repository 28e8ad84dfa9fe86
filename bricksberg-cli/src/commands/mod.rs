pub(crate) mod config;
pub(crate) mod jobs;
pub(crate) mod schedule;
pub(crate) mod stats;
pub(crate) mod submit;

use std::path::{Path, PathBuf};

use bricksberg_import::Settings;
use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;
use rusqlite::Connection;

use crate::CliError;

/// Database path from `--db`, else from settings.
pub(crate) fn resolve_db_path(db: Option<PathBuf>, settings: &Settings) -> PathBuf {
    db.unwrap_or_else(|| settings.database_path())
}

/// Open the database, creating it and its directory on first use.
pub(crate) fn open_db(path: &Path) -> Result<Connection, CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    bricksberg_db::open_database(path).map_err(|e| {
        CliError::database(format!(
            "Failed to open database at {}: {}",
            path.display(),
            e
        ))
    })
}

/// Open an existing database read-mostly; `None` if the file does not exist yet.
pub(crate) fn open_existing_db(path: &Path) -> Result<Option<Connection>, CliError> {
    if !path.exists() {
        log::warn!("No database found at {}", path.display());
        log::info!("Run 'bricksberg submit catalog ...' to create one.");
        return Ok(None);
    }
    open_db(path).map(Some)
}

/// Job or task status, colored by outcome.
pub(crate) fn colored_status(status: &str) -> String {
    match status {
        "complete" => status
            .if_supports_color(Stdout, |t| t.green())
            .to_string(),
        "failed" | "unknown_error" => status.if_supports_color(Stdout, |t| t.red()).to_string(),
        "running" => status.if_supports_color(Stdout, |t| t.cyan()).to_string(),
        "pending" => status
            .if_supports_color(Stdout, |t| t.dimmed())
            .to_string(),
        _ => status
            .if_supports_color(Stdout, |t| t.yellow())
            .to_string(),
    }
}
