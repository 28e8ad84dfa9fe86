//! Pipeline settings.
//!
//! Read from `~/.config/bricksberg/settings.toml`, with `BRICKSBERG_*`
//! environment variables taking priority over the file. Every field has a
//! default, so a missing file is not an error.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest batch size a configured value is clamped to.
pub const MIN_BATCH_SIZE: usize = 50;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Could not serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid value for ${var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },
}

/// How relationship tasks replace the lines of a parent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationStrategy {
    /// Clear a parent's lines on first touch in a job, then append per row.
    ClearThenAppend,
    /// Stage every line and write each parent once when the file is done.
    #[default]
    Buffered,
}

impl RelationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClearThenAppend => "clear_then_append",
            Self::Buffered => "buffered",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "clear_then_append" | "clear" | "immediate" => Some(Self::ClearThenAppend),
            "buffered" | "buffer" | "buffer_and_flush" => Some(Self::Buffered),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Database file; defaults to the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    pub tick_interval_secs: u64,
    pub catalog_batch_size: usize,
    pub inventory_batch_size: usize,
    pub job_timeout_secs: u64,
    pub max_log_entries: usize,
    /// Wall-clock budget of one batch before it yields early.
    pub batch_time_budget_secs: u64,
    pub relationship_strategy: RelationStrategy,
    /// How often the run loop checks for wake requests between ticks.
    pub wake_poll_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: None,
            tick_interval_secs: 60,
            catalog_batch_size: 200,
            inventory_batch_size: 300,
            job_timeout_secs: 300,
            max_log_entries: 200,
            batch_time_budget_secs: 45,
            relationship_strategy: RelationStrategy::Buffered,
            wake_poll_secs: 5,
        }
    }
}

/// Where a setting's value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingSource {
    EnvVar(&'static str),
    ConfigFile,
    Default,
}

impl std::fmt::Display for SettingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EnvVar(var) => write!(f, "env ${}", var),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// One resolved setting, for display.
#[derive(Debug, Clone)]
pub struct SettingEntry {
    pub key: &'static str,
    pub value: String,
    pub source: SettingSource,
}

/// Canonical path to the settings file: `~/.config/bricksberg/settings.toml`.
pub fn settings_path() -> PathBuf {
    let config = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    config.join("bricksberg").join("settings.toml")
}

/// Default database location: `<data dir>/bricksberg/bricksberg.db`.
pub fn default_database_path() -> PathBuf {
    let data = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    data.join("bricksberg").join("bricksberg.db")
}

const ENV_DB: &str = "BRICKSBERG_DB";
const ENV_TICK_INTERVAL: &str = "BRICKSBERG_TICK_INTERVAL";
const ENV_CATALOG_BATCH: &str = "BRICKSBERG_CATALOG_BATCH_SIZE";
const ENV_INVENTORY_BATCH: &str = "BRICKSBERG_INVENTORY_BATCH_SIZE";
const ENV_JOB_TIMEOUT: &str = "BRICKSBERG_JOB_TIMEOUT";
const ENV_MAX_LOG: &str = "BRICKSBERG_MAX_LOG_ENTRIES";
const ENV_TIME_BUDGET: &str = "BRICKSBERG_BATCH_TIME_BUDGET";
const ENV_RELATION_STRATEGY: &str = "BRICKSBERG_RELATIONSHIP_STRATEGY";
const ENV_WAKE_POLL: &str = "BRICKSBERG_WAKE_POLL";

impl Settings {
    /// Load from the settings file and the process environment.
    pub fn load() -> Result<Self, SettingsError> {
        Ok(Self::load_with_sources()?.0)
    }

    /// Like [`Settings::load`], also reporting where each value came from.
    pub fn load_with_sources() -> Result<(Self, Vec<SettingEntry>), SettingsError> {
        let path = settings_path();
        let (mut settings, file_keys) = Self::read_file(&path)?;
        let env_keys = settings.apply_env(|var| std::env::var(var).ok())?;
        let entries = settings.entries(&file_keys, &env_keys);
        Ok((settings, entries))
    }

    /// Load from a specific file, without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        Ok(Self::read_file(path)?.0)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(contents)?)
    }

    /// Write the settings atomically (temp file, then rename).
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Rewrite the file at `path` with every key spelled out, keeping the
    /// values it already sets. Environment overrides are not written.
    pub fn init_file(path: &Path) -> Result<Self, SettingsError> {
        let settings = Self::load_from(path)?;
        settings.save(path)?;
        Ok(settings)
    }

    fn read_file(path: &Path) -> Result<(Self, Vec<String>), SettingsError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Self::default(), vec![])),
            Err(e) => return Err(e.into()),
        };
        let table: toml::Table = toml::from_str(&contents)?;
        let keys = table.keys().cloned().collect();
        Ok((Self::from_toml_str(&contents)?, keys))
    }

    /// Apply `BRICKSBERG_*` overrides. Returns the names of the variables used.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Vec<&'static str>, SettingsError> {
        let mut used = Vec::new();

        if let Some(v) = lookup(ENV_DB) {
            self.database_path = Some(PathBuf::from(v));
            used.push(ENV_DB);
        }
        if let Some(v) = lookup(ENV_TICK_INTERVAL) {
            self.tick_interval_secs = parse_env(ENV_TICK_INTERVAL, &v)?;
            used.push(ENV_TICK_INTERVAL);
        }
        if let Some(v) = lookup(ENV_CATALOG_BATCH) {
            self.catalog_batch_size = parse_env(ENV_CATALOG_BATCH, &v)?;
            used.push(ENV_CATALOG_BATCH);
        }
        if let Some(v) = lookup(ENV_INVENTORY_BATCH) {
            self.inventory_batch_size = parse_env(ENV_INVENTORY_BATCH, &v)?;
            used.push(ENV_INVENTORY_BATCH);
        }
        if let Some(v) = lookup(ENV_JOB_TIMEOUT) {
            self.job_timeout_secs = parse_env(ENV_JOB_TIMEOUT, &v)?;
            used.push(ENV_JOB_TIMEOUT);
        }
        if let Some(v) = lookup(ENV_MAX_LOG) {
            self.max_log_entries = parse_env(ENV_MAX_LOG, &v)?;
            used.push(ENV_MAX_LOG);
        }
        if let Some(v) = lookup(ENV_TIME_BUDGET) {
            self.batch_time_budget_secs = parse_env(ENV_TIME_BUDGET, &v)?;
            used.push(ENV_TIME_BUDGET);
        }
        if let Some(v) = lookup(ENV_RELATION_STRATEGY) {
            self.relationship_strategy =
                RelationStrategy::from_str_loose(&v).ok_or(SettingsError::InvalidEnv {
                    var: ENV_RELATION_STRATEGY,
                    value: v.clone(),
                })?;
            used.push(ENV_RELATION_STRATEGY);
        }
        if let Some(v) = lookup(ENV_WAKE_POLL) {
            self.wake_poll_secs = parse_env(ENV_WAKE_POLL, &v)?;
            used.push(ENV_WAKE_POLL);
        }

        Ok(used)
    }

    fn entries(&self, file_keys: &[String], env_vars: &[&'static str]) -> Vec<SettingEntry> {
        let source = |key: &str, var: &'static str| {
            if env_vars.contains(&var) {
                SettingSource::EnvVar(var)
            } else if file_keys.iter().any(|k| k == key) {
                SettingSource::ConfigFile
            } else {
                SettingSource::Default
            }
        };
        let entry = |key: &'static str, var: &'static str, value: String| SettingEntry {
            key,
            value,
            source: source(key, var),
        };

        vec![
            entry(
                "database_path",
                ENV_DB,
                self.database_path().display().to_string(),
            ),
            entry(
                "tick_interval_secs",
                ENV_TICK_INTERVAL,
                self.tick_interval_secs.to_string(),
            ),
            entry(
                "catalog_batch_size",
                ENV_CATALOG_BATCH,
                self.effective_catalog_batch_size().to_string(),
            ),
            entry(
                "inventory_batch_size",
                ENV_INVENTORY_BATCH,
                self.effective_inventory_batch_size().to_string(),
            ),
            entry(
                "job_timeout_secs",
                ENV_JOB_TIMEOUT,
                self.job_timeout_secs.to_string(),
            ),
            entry(
                "max_log_entries",
                ENV_MAX_LOG,
                self.max_log_entries.to_string(),
            ),
            entry(
                "batch_time_budget_secs",
                ENV_TIME_BUDGET,
                self.batch_time_budget_secs.to_string(),
            ),
            entry(
                "relationship_strategy",
                ENV_RELATION_STRATEGY,
                self.relationship_strategy.as_str().to_string(),
            ),
            entry(
                "wake_poll_secs",
                ENV_WAKE_POLL,
                self.wake_poll_secs.to_string(),
            ),
        ]
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }

    pub fn effective_catalog_batch_size(&self) -> usize {
        self.catalog_batch_size.max(MIN_BATCH_SIZE)
    }

    pub fn effective_inventory_batch_size(&self) -> usize {
        self.inventory_batch_size.max(MIN_BATCH_SIZE)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn batch_time_budget(&self) -> Duration {
        Duration::from_secs(self.batch_time_budget_secs.max(1))
    }

    pub fn wake_poll(&self) -> Duration {
        Duration::from_secs(self.wake_poll_secs.max(1))
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, SettingsError> {
    value.trim().parse().map_err(|_| SettingsError::InvalidEnv {
        var,
        value: value.to_string(),
    })
}
