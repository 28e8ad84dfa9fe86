use std::path::Path;

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use super::open_existing_db;
use crate::CliError;

pub(crate) fn run_stats(db_path: &Path) -> Result<(), CliError> {
    let Some(conn) = open_existing_db(db_path)? else {
        return Ok(());
    };

    let counts = bricksberg_db::catalog_counts(&conn)
        .map_err(|e| CliError::database(format!("Failed to query catalog counts: {}", e)))?;

    log::info!(
        "{}",
        "Catalog Database Statistics".if_supports_color(Stdout, |t| t.bold()),
    );
    log::info!("  Database: {}", db_path.display());
    crate::log_blank();
    for (kind, n) in &counts.entities {
        log::info!("  {:<18}{:>8}", format!("{}:", kind.label()), n);
    }
    log::info!("  {:<18}{:>8}", "Relation lines:", counts.relationship_lines);
    crate::log_blank();
    log::info!(
        "  Jobs:  {} pending, {} running, {} complete, {} failed",
        counts.jobs_pending,
        counts.jobs_running,
        counts.jobs_complete,
        counts.jobs_failed,
    );

    Ok(())
}
