//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using
//! the `clap` crate. These arguments are the launcher's contract with the
//! collector and take precedence over the TOML file and environment.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Periodic host telemetry collector writing a bounded JSON array.
#[derive(Parser, Debug, Default)]
#[command(name = "hostwatch", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to an optional TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Collection mode: minimal, extended or full.
    #[arg(long, value_name = "MODE")]
    pub mode: Option<String>,

    /// Minutes between two collections.
    #[arg(long, value_name = "MINUTES")]
    pub interval: Option<String>,

    /// Path of the JSON array output file.
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// User recorded with every entry (defaults to the login name).
    #[arg(long, value_name = "USER")]
    pub user: Option<String>,

    /// Comma separated list of owner/repo names.
    #[arg(long, value_name = "REPOS")]
    pub repos: Option<String>,

    /// Maximum number of entries kept in the output file.
    #[arg(long, value_name = "N")]
    pub max_entries: Option<usize>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Write the process id to this file while running.
    #[arg(long, value_name = "FILE")]
    pub pid_file: Option<PathBuf>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(mode) = &self.mode {
            dict.insert("mode".into(), Value::from(mode.clone()));
        }

        // Numeric intervals are passed as numbers; anything else is kept as
        // text and rejected later with a fallback to the default.
        if let Some(interval) = &self.interval {
            let value = match interval.trim().parse::<i64>() {
                Ok(minutes) => Value::from(minutes),
                Err(_) => Value::from(interval.clone()),
            };
            dict.insert("interval_minutes".into(), value);
        }

        if let Some(output) = &self.output {
            dict.insert(
                "output".into(),
                Value::from(output.to_string_lossy().into_owned()),
            );
        }

        if let Some(user) = &self.user {
            dict.insert("user".into(), Value::from(user.clone()));
        }

        if let Some(repos) = &self.repos {
            dict.insert("repos".into(), Value::from(repos.clone()));
        }

        if let Some(max_entries) = self.max_entries {
            dict.insert("max_entries".into(), Value::from(max_entries as u64));
        }

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        if let Some(pid_file) = &self.pid_file {
            dict.insert(
                "pid_file".into(),
                Value::from(pid_file.to_string_lossy().into_owned()),
            );
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
