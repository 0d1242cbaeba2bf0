//! Configuration management for HostWatch
//!
//! This module defines the main `Config` struct, responsible for holding all
//! application settings. It uses the `figment` crate to layer defaults, an
//! optional TOML file, `HOSTWATCH_` environment variables and command line
//! arguments, then resolves the raw values into typed `MonitorSettings`.

use crate::cli::Cli;
use crate::context;
use crate::core::Mode;
use crate::lock::LockOptions;
use crate::store::DEFAULT_MAX_ENTRIES;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_INTERVAL_MINUTES: u64 = 1;
pub const DEFAULT_OUTPUT: &str = "system_metrics.json";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// Collection profile: `minimal`, `extended` or `full`.
    pub mode: String,
    /// Minutes between two collections.
    pub interval_minutes: IntervalSetting,
    /// Path of the JSON array file.
    pub output: PathBuf,
    /// User recorded in the github context. Defaults to the login name.
    pub user: Option<String>,
    /// Comma separated `owner/repo` list.
    pub repos: String,
    /// Maximum number of entries kept in the output file.
    pub max_entries: usize,
    /// Where to write this process's pid, if anywhere.
    pub pid_file: Option<PathBuf>,
    /// Output file lock settings.
    pub lock: LockConfig,
}

/// The interval as given by the caller.
///
/// Kept loose so a non numeric value falls back to the default instead of
/// failing the whole configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntervalSetting {
    Minutes(i64),
    Raw(String),
}

/// Configuration for the output file lock.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// Number of polls before a held lock is considered stale.
    pub timeout_ticks: u32,
    /// Milliseconds between two polls.
    pub poll_interval_ms: u64,
}

/// Fully resolved settings threaded through the monitor loop.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub mode: Mode,
    pub interval: Duration,
    pub output: PathBuf,
    pub user: String,
    pub repos: String,
    pub max_entries: usize,
    pub lock: LockOptions,
}

impl Config {
    /// Loads the application configuration.
    ///
    /// Sources are merged in increasing priority: built-in defaults, the TOML
    /// file named by `--config` (if any), `HOSTWATCH_` environment variables,
    /// then command line flags.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(path) = &cli.config {
            figment = figment.merge(Toml::file(path));
        }
        let config: Config = figment
            // e.g. HOSTWATCH_MAX_ENTRIES=60 or HOSTWATCH_LOCK__TIMEOUT_TICKS=4
            .merge(Env::prefixed("HOSTWATCH_").split("__"))
            .merge(cli)
            .extract()?;
        Ok(config)
    }

    /// Resolves raw values into typed settings.
    ///
    /// Invalid mode, interval or entry cap values fall back to their
    /// defaults with a warning.
    pub fn settings(&self) -> MonitorSettings {
        let mode = self.mode.parse::<Mode>().unwrap_or_else(|e| {
            warn!("{}, falling back to '{}'", e, Mode::default());
            Mode::default()
        });

        let interval = match &self.interval_minutes {
            IntervalSetting::Minutes(minutes) => u64::try_from(*minutes)
                .ok()
                .and_then(interval_from_minutes)
                .unwrap_or_else(|| {
                    warn!(
                        "Invalid interval {}, falling back to {} minute(s)",
                        minutes, DEFAULT_INTERVAL_MINUTES
                    );
                    default_interval()
                }),
            IntervalSetting::Raw(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .and_then(interval_from_minutes)
                .unwrap_or_else(|| {
                    warn!(
                        "Invalid interval '{}', falling back to {} minute(s)",
                        raw, DEFAULT_INTERVAL_MINUTES
                    );
                    default_interval()
                }),
        };

        let max_entries = if self.max_entries == 0 {
            warn!(
                "max_entries must be at least 1, falling back to {}",
                DEFAULT_MAX_ENTRIES
            );
            DEFAULT_MAX_ENTRIES
        } else {
            self.max_entries
        };

        let user = self
            .user
            .as_deref()
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .map(str::to_string)
            .unwrap_or_else(context::resolve_user);

        MonitorSettings {
            mode,
            interval,
            output: self.output.clone(),
            user,
            repos: self.repos.clone(),
            max_entries,
            lock: LockOptions::from(&self.lock),
        }
    }
}

/// Converts a positive minute count to a sleep duration. `None` for zero or
/// counts whose length in seconds does not fit in a `u64`.
fn interval_from_minutes(minutes: u64) -> Option<Duration> {
    if minutes == 0 {
        return None;
    }
    minutes.checked_mul(60).map(Duration::from_secs)
}

fn default_interval() -> Duration {
    Duration::from_secs(DEFAULT_INTERVAL_MINUTES * 60)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            mode: Mode::default().to_string(),
            interval_minutes: IntervalSetting::Minutes(DEFAULT_INTERVAL_MINUTES as i64),
            output: PathBuf::from(DEFAULT_OUTPUT),
            user: None,
            repos: String::new(),
            max_entries: DEFAULT_MAX_ENTRIES,
            pid_file: None,
            lock: LockConfig::default(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ticks: 10,
            poll_interval_ms: 500,
        }
    }
}
