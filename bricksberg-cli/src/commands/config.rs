use std::path::Path;

use bricksberg_import::{SettingSource, Settings};
use bricksberg_import::settings::{SettingEntry, settings_path};
use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use crate::CliError;

/// Show resolved settings and where each value came from.
pub(crate) fn run_config_show(entries: &[SettingEntry], db_override: Option<&Path>) {
    let path = settings_path();

    log::info!(
        "{}",
        "Bricksberg Configuration".if_supports_color(Stdout, |t| t.bold()),
    );
    crate::log_blank();

    if path.exists() {
        log::info!(
            "  Config file: {} {}",
            path.display().if_supports_color(Stdout, |t| t.cyan()),
            "(exists)".if_supports_color(Stdout, |t| t.green()),
        );
    } else {
        log::info!(
            "  Config file: {} {}",
            path.display().if_supports_color(Stdout, |t| t.cyan()),
            "(not found)".if_supports_color(Stdout, |t| t.dimmed()),
        );
    }
    crate::log_blank();

    for entry in entries {
        let source = match &entry.source {
            SettingSource::Default => entry
                .source
                .to_string()
                .if_supports_color(Stdout, |t| t.dimmed())
                .to_string(),
            _ => entry
                .source
                .to_string()
                .if_supports_color(Stdout, |t| t.green())
                .to_string(),
        };
        log::info!("  {:<24} {:<40} {}", entry.key, entry.value, source);
    }

    if let Some(db) = db_override {
        crate::log_blank();
        log::info!(
            "  --db overrides database_path: {}",
            db.display().if_supports_color(Stdout, |t| t.cyan()),
        );
    }
}

/// Write a complete settings file, preserving any values it already has.
pub(crate) fn run_config_init() -> Result<(), CliError> {
    let path = settings_path();
    let existed = path.exists();
    Settings::init_file(&path)?;
    log::info!(
        "{} Settings {} {}",
        "\u{2714}".if_supports_color(Stdout, |t| t.green()),
        if existed { "updated at" } else { "written to" },
        path.display().if_supports_color(Stdout, |t| t.cyan()),
    );
    Ok(())
}

/// Print the settings file path.
pub(crate) fn run_config_path() {
    log::info!("{}", settings_path().display());
}
