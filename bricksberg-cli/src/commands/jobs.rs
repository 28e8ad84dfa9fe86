//! Job listing, inspection and control.

use std::path::Path;

use bricksberg_catalog::{JobId, JobStatus};
use bricksberg_import::{JobSummary, Settings};
use chrono::Utc;
use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use super::{colored_status, open_db, open_existing_db};
use crate::CliError;

pub(crate) fn run_jobs(db_path: &Path, status: Option<&str>) -> Result<(), CliError> {
    let status = status
        .map(|s| {
            JobStatus::from_str_loose(s)
                .ok_or_else(|| CliError::usage(format!("Unknown job status '{}'", s)))
        })
        .transpose()?;
    let Some(conn) = open_existing_db(db_path)? else {
        return Ok(());
    };

    let jobs = bricksberg_db::list_jobs(&conn, status)?;
    if jobs.is_empty() {
        log::info!("No jobs");
        return Ok(());
    }

    log::info!(
        "{}",
        format!(
            "{:>6}  {:<16}  {:<10}  {:>7}  {}",
            "ID", "KIND", "STATUS", "TASK", "LAST ACTIVITY"
        )
        .if_supports_color(Stdout, |t| t.bold()),
    );
    for job in &jobs {
        let task = if job.task_count == 0 {
            "-".to_string()
        } else {
            format!(
                "{}/{}",
                (job.current_task_index + 1).min(job.task_count),
                job.task_count
            )
        };
        // Padding goes outside the color codes so columns stay aligned.
        let pad = " ".repeat(10usize.saturating_sub(job.status.len()));
        log::info!(
            "{:>6}  {:<16}  {}{}  {:>7}  {}",
            job.id,
            job.kind,
            colored_status(&job.status),
            pad,
            task,
            job.last_activity,
        );
    }
    Ok(())
}

fn print_summary(summary: &JobSummary) {
    log::info!(
        "{} {} ({})",
        "Job".if_supports_color(Stdout, |t| t.bold()),
        summary.id.if_supports_color(Stdout, |t| t.bold()),
        summary.kind,
    );
    log::info!("  Status:        {}", colored_status(summary.status.as_str()));
    log::info!(
        "  Created:       {}",
        summary.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    log::info!(
        "  Last activity: {}",
        summary.last_activity.format("%Y-%m-%d %H:%M:%S UTC")
    );
    log::info!(
        "  Tasks:         {}/{} finished",
        summary.finished_tasks(),
        summary.tasks.len()
    );
    crate::log_blank();

    let current = summary.current_task().map(|t| t.type_key.as_str());
    for task in &summary.tasks {
        let marker = if Some(task.type_key.as_str()) == current {
            ">".if_supports_color(Stdout, |t| t.cyan()).to_string()
        } else {
            " ".to_string()
        };
        let rows = match task.total_rows {
            Some(total) => format!("{}/{} rows", task.data_rows().min(total), total),
            None => format!("{} rows", task.data_rows()),
        };
        log::info!(
            "  {} {:<20} {:<24} {} ({})",
            marker,
            task.type_key,
            task.file_name,
            colored_status(task.status.as_str()),
            rows,
        );
    }

    if !summary.log_tail.is_empty() {
        crate::log_blank();
        log::info!("{}", "Recent log".if_supports_color(Stdout, |t| t.bold()));
        for entry in &summary.log_tail {
            log::info!("  {}", entry);
        }
    }
}

pub(crate) fn run_status(db_path: &Path, id: JobId, lines: usize) -> Result<(), CliError> {
    let Some(conn) = open_existing_db(db_path)? else {
        return Ok(());
    };
    match bricksberg_import::job_summary(&conn, id, lines)? {
        Some(summary) => print_summary(&summary),
        None => log::warn!("Job {} not found", id),
    }
    Ok(())
}

pub(crate) fn run_cancel(settings: &Settings, db_path: &Path, id: JobId) -> Result<(), CliError> {
    let conn = open_db(db_path)?;
    if bricksberg_import::cancel_job(&conn, id, settings.max_log_entries, Utc::now())? {
        log::info!("Cancelled job {}", id);
    } else {
        log::info!("Job {} already finished; nothing to cancel", id);
    }
    Ok(())
}

pub(crate) fn run_delete(db_path: &Path, id: JobId) -> Result<(), CliError> {
    let conn = open_db(db_path)?;
    bricksberg_import::delete_job(&conn, id)?;
    Ok(())
}
