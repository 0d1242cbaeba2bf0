//! HostWatch - Periodic Host Telemetry Collector
//!
//! Samples host metrics on a fixed interval and appends them to a bounded,
//! lock-protected JSON array file until SIGINT or SIGTERM is received.

use anyhow::{Context, Result};
use clap::Parser;
use hostwatch::{
    cli::Cli, config::Config, monitor::Monitor, sampling::SysinfoSource, shutdown,
};
use log::{error, info, warn};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        // Manually initialize logger for this specific error
        env_logger::init();
        error!("Failed to load configuration: {}", err);
        std::process::exit(1);
    });

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("HostWatch starting up...");
    let monitor = Monitor::new(config.settings(), Arc::new(SysinfoSource::new()));
    let settings = monitor.settings();

    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Mode: {}", settings.mode);
    info!("Interval: {}s", settings.interval.as_secs());
    info!("Output: {}", settings.output.display());
    info!("Max Entries: {}", settings.max_entries);
    info!("User: {}", settings.user);
    info!(
        "Repositories: {}",
        if settings.repos.trim().is_empty() {
            "None"
        } else {
            settings.repos.as_str()
        }
    );
    info!(
        "Lock Timeout: {:?} ({} polls)",
        settings.lock.timeout(),
        settings.lock.timeout_ticks
    );
    info!("-------------------------------------------------------");

    if let Some(pid_file) = &config.pid_file {
        write_pid_file(pid_file)?;
    }

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    tokio::spawn(shutdown::listen_for_signals(shutdown_tx));

    let result = monitor.run(shutdown_rx).await;

    if let Some(pid_file) = &config.pid_file {
        if let Err(e) = std::fs::remove_file(pid_file) {
            warn!("Failed to remove pid file {}: {}", pid_file.display(), e);
        }
    }

    match &result {
        Ok(()) => info!("HostWatch stopped."),
        Err(e) => error!("HostWatch terminated with an error: {:#}", e),
    }
    result
}

fn write_pid_file(path: &Path) -> Result<()> {
    std::fs::write(path, format!("{}\n", std::process::id()))
        .with_context(|| format!("failed to write pid file {}", path.display()))?;
    info!("Wrote pid {} to {}", std::process::id(), path.display());
    Ok(())
}
