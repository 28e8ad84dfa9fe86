//! bricksberg CLI
//!
//! Command-line interface for queueing LEGO catalog imports and driving the
//! import scheduler.

mod cli_types;
mod commands;
mod error;
mod logging;

use clap::Parser;

use bricksberg_import::Settings;

use cli_types::{Cli, Commands, ConfigAction, SubmitAction};
pub(crate) use error::CliError;
pub(crate) use logging::log_blank;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logger(cli.quiet, cli.verbose, cli.logfile.as_deref()) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let (settings, entries) = Settings::load_with_sources()?;
    let db_path = commands::resolve_db_path(cli.db.clone(), &settings);

    match cli.command {
        Commands::Submit { action } => match action {
            SubmitAction::Catalog { files } => {
                commands::submit::run_submit_catalog(&settings, &db_path, &files)
            }
            SubmitAction::Inventory { path } => {
                commands::submit::run_submit_inventory(&settings, &db_path, &path)
            }
        },
        Commands::Tick { until_idle } => {
            commands::schedule::run_tick(&settings, &db_path, until_idle)
        }
        Commands::Run { interval } => commands::schedule::run_daemon(&settings, &db_path, interval),
        Commands::Jobs { status } => commands::jobs::run_jobs(&db_path, status.as_deref()),
        Commands::Status { id, lines } => commands::jobs::run_status(&db_path, id, lines),
        Commands::Cancel { id } => commands::jobs::run_cancel(&settings, &db_path, id),
        Commands::Delete { id } => commands::jobs::run_delete(&db_path, id),
        Commands::Stats => commands::stats::run_stats(&db_path),
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                commands::config::run_config_show(&entries, cli.db.as_deref());
                Ok(())
            }
            ConfigAction::Init => commands::config::run_config_init(),
            ConfigAction::Path => {
                commands::config::run_config_path();
                Ok(())
            }
        },
    }
}
