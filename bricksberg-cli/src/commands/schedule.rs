//! `tick` and `run`: drive the scheduler once or on an interval.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bricksberg_import::{BatchOutcome, Scheduler, SchedulerOptions, Settings, TickOutcome, TickReport};
use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;
use tokio::time::{MissedTickBehavior, interval};

use super::{colored_status, open_db};
use crate::CliError;

fn describe_batch(batch: &BatchOutcome) -> String {
    match batch {
        BatchOutcome::Progress {
            type_key,
            rows_processed,
        } => format!("{}: {} lines read", type_key, rows_processed),
        BatchOutcome::TaskComplete {
            type_key,
            total_rows,
        } => format!("{}: complete, {} rows", type_key, total_rows),
        BatchOutcome::TaskSkipped { type_key, reason } => {
            format!("{}: skipped ({})", type_key, reason)
        }
    }
}

fn print_report(report: &TickReport) {
    if let Some(job_id) = report.recovered {
        log::warn!("Job {} timed out and was failed", job_id);
    }
    match &report.outcome {
        TickOutcome::Idle => log::debug!("No job to run"),
        TickOutcome::Busy { job_id } => {
            log::info!("Job {} holds the scheduler lock; nothing to do", job_id)
        }
        TickOutcome::Worked {
            job_id,
            status,
            batch,
        } => log::info!(
            "Job {} [{}] {}",
            job_id.if_supports_color(Stdout, |t| t.bold()),
            colored_status(status.as_str()),
            describe_batch(batch),
        ),
        TickOutcome::Abandoned { job_id } => {
            log::info!("Job {} is no longer running; batch abandoned", job_id)
        }
        TickOutcome::Failed { job_id, reason } => {
            log::error!("Job {} failed: {}", job_id, reason)
        }
    }
}

/// Whether another tick right away could make progress.
fn has_more_work(outcome: &TickOutcome) -> bool {
    matches!(
        outcome,
        TickOutcome::Worked { .. } | TickOutcome::Abandoned { .. } | TickOutcome::Failed { .. }
    )
}

pub(crate) fn run_tick(settings: &Settings, db_path: &Path, until_idle: bool) -> Result<(), CliError> {
    let conn = open_db(db_path)?;
    let mut scheduler = Scheduler::new(conn, SchedulerOptions::from_settings(settings));

    loop {
        let report = scheduler.tick()?;
        print_report(&report);
        if !until_idle || !has_more_work(&report.outcome) {
            if report.outcome == TickOutcome::Idle {
                log::info!("No pending or running jobs");
            }
            break;
        }
    }
    Ok(())
}

/// Run one tick on a blocking thread.
async fn tick_blocking(scheduler: &Arc<Mutex<Scheduler>>) -> Result<TickReport, CliError> {
    let scheduler = Arc::clone(scheduler);
    tokio::task::spawn_blocking(move || -> Result<TickReport, CliError> {
        let mut scheduler = scheduler
            .lock()
            .map_err(|_| CliError::runtime("scheduler mutex poisoned"))?;
        Ok(scheduler.tick()?)
    })
    .await
    .map_err(|e| CliError::runtime(format!("Tick task failed: {}", e)))?
}

async fn wake_requested(scheduler: &Arc<Mutex<Scheduler>>) -> Result<bool, CliError> {
    let scheduler = Arc::clone(scheduler);
    tokio::task::spawn_blocking(move || -> Result<bool, CliError> {
        let scheduler = scheduler
            .lock()
            .map_err(|_| CliError::runtime("scheduler mutex poisoned"))?;
        Ok(bricksberg_db::take_wake_request(scheduler.connection())?)
    })
    .await
    .map_err(|e| CliError::runtime(format!("Wake poll failed: {}", e)))?
}

async fn tick_and_report(scheduler: &Arc<Mutex<Scheduler>>) {
    match tick_blocking(scheduler).await {
        Ok(report) => print_report(&report),
        Err(e) => log::error!("Tick failed: {}", e),
    }
}

pub(crate) fn run_daemon(
    settings: &Settings,
    db_path: &Path,
    interval_secs: Option<u64>,
) -> Result<(), CliError> {
    let conn = open_db(db_path)?;
    let scheduler = Arc::new(Mutex::new(Scheduler::new(
        conn,
        SchedulerOptions::from_settings(settings),
    )));
    let tick_every = interval_secs
        .map(|s| Duration::from_secs(s.max(1)))
        .unwrap_or_else(|| settings.tick_interval());
    let wake_poll = settings.wake_poll();

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::runtime(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async {
        log::info!(
            "Scheduler running on {} (tick every {}s, Ctrl-C to stop)",
            db_path.display().if_supports_color(Stdout, |t| t.cyan()),
            tick_every.as_secs(),
        );

        let mut ticker = interval(tick_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut wake = interval(wake_poll);
        wake.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("Shutting down");
                    break;
                }
                _ = ticker.tick() => tick_and_report(&scheduler).await,
                _ = wake.tick() => {
                    match wake_requested(&scheduler).await {
                        Ok(true) => {
                            log::debug!("Wake request received");
                            tick_and_report(&scheduler).await;
                            ticker.reset();
                        }
                        Ok(false) => {}
                        Err(e) => log::error!("{}", e),
                    }
                }
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_progress_outcomes_continue_the_loop() {
        assert!(!has_more_work(&TickOutcome::Idle));
        assert!(!has_more_work(&TickOutcome::Busy { job_id: 1 }));
        assert!(has_more_work(&TickOutcome::Abandoned { job_id: 1 }));
        assert!(has_more_work(&TickOutcome::Failed {
            job_id: 1,
            reason: "boom".into(),
        }));
    }
}
