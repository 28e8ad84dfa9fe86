use std::path::{Path, PathBuf};

use bricksberg_import::{CATALOG_ORDER, Settings};
use chrono::Utc;
use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use super::open_db;
use crate::CliError;

/// Split `KEY=PATH` arguments into `(key, path)` pairs.
pub(crate) fn parse_file_args(args: &[String]) -> Result<Vec<(String, PathBuf)>, CliError> {
    args.iter()
        .map(|arg| {
            let (key, path) = arg.split_once('=').ok_or_else(|| {
                CliError::usage(format!("Expected KEY=PATH, got '{}'", arg))
            })?;
            let key = key.trim().to_lowercase();
            if key.is_empty() || path.trim().is_empty() {
                return Err(CliError::usage(format!("Expected KEY=PATH, got '{}'", arg)));
            }
            Ok((key, PathBuf::from(path.trim())))
        })
        .collect()
}

fn warn_missing(path: &Path) {
    if !path.exists() {
        log::warn!(
            "{} does not exist yet; the task will be skipped if it is still missing",
            path.display()
        );
    }
}

pub(crate) fn run_submit_catalog(
    settings: &Settings,
    db_path: &Path,
    args: &[String],
) -> Result<(), CliError> {
    let files = parse_file_args(args)?;
    for (key, path) in &files {
        if CATALOG_ORDER.contains(&key.as_str()) {
            warn_missing(path);
        }
    }

    let conn = open_db(db_path)?;
    let job_id =
        bricksberg_import::submit_catalog_job(&conn, &files, Utc::now(), settings.max_log_entries)?;
    log::info!(
        "Queued catalog job {}",
        job_id.if_supports_color(Stdout, |t| t.bold()),
    );
    Ok(())
}

pub(crate) fn run_submit_inventory(
    settings: &Settings,
    db_path: &Path,
    path: &Path,
) -> Result<(), CliError> {
    warn_missing(path);
    let conn = open_db(db_path)?;
    let job_id =
        bricksberg_import::submit_inventory_job(&conn, path, Utc::now(), settings.max_log_entries)?;
    log::info!(
        "Queued inventory job {}",
        job_id.if_supports_color(Stdout, |t| t.bold()),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_path_pairs() {
        let args = vec!["Colors=/data/colors.csv".to_string(), "sets = sets.csv".to_string()];
        let files = parse_file_args(&args).unwrap();
        assert_eq!(
            files,
            vec![
                ("colors".to_string(), PathBuf::from("/data/colors.csv")),
                ("sets".to_string(), PathBuf::from("sets.csv")),
            ]
        );
    }

    #[test]
    fn rejects_arguments_without_a_key() {
        assert!(parse_file_args(&["colors.csv".to_string()]).is_err());
        assert!(parse_file_args(&["=colors.csv".to_string()]).is_err());
        assert!(parse_file_args(&["colors=".to_string()]).is_err());
    }
}
