//! CLI type definitions: command enums and argument structs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bricksberg")]
#[command(about = "Resumable batch import of LEGO catalog and inventory CSVs", long_about = None)]
pub(crate) struct Cli {
    /// Database file (overrides the configured database_path)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Only show warnings and errors (suppress normal output)
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Enable verbose/debug logging (timestamps + debug-level messages)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write log output to a file (ANSI codes stripped)
    #[arg(long, global = true)]
    pub logfile: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Queue an import job
    Submit {
        #[command(subcommand)]
        action: SubmitAction,
    },

    /// Run one scheduler tick (one batch of the active job)
    Tick {
        /// Keep ticking until no job is left to run
        #[arg(long)]
        until_idle: bool,
    },

    /// Run the scheduler loop until interrupted
    Run {
        /// Seconds between ticks (overrides tick_interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// List import jobs, newest first
    Jobs {
        /// Only show jobs with this status (pending, running, complete, failed)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show a job's tasks and recent log
    Status {
        /// Job id
        id: i64,

        /// Number of log lines to show
        #[arg(short = 'n', long, default_value = "20")]
        lines: usize,
    },

    /// Stop a pending or running job
    Cancel {
        /// Job id
        id: i64,
    },

    /// Delete a job with its tasks and log
    Delete {
        /// Job id
        id: i64,
    },

    /// Show catalog record counts and job totals
    Stats,

    /// Inspect settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum SubmitAction {
    /// Queue Rebrickable catalog files as KEY=PATH pairs (e.g. colors=colors.csv)
    Catalog {
        #[arg(required = true, value_name = "KEY=PATH")]
        files: Vec<String>,
    },

    /// Queue a BrickOwl inventory export
    Inventory {
        /// Path to the inventory CSV
        path: PathBuf,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Show current settings and their sources
    Show,

    /// Write the settings file with every key, keeping values already set
    Init,

    /// Print the settings file path
    Path,
}
