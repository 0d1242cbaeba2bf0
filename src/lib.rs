/// HostWatch - A periodic host telemetry collector
///
/// This library samples CPU, memory, disk, network and process metrics,
/// tags each sample with its collection context, and appends it to a
/// bounded, lock-protected JSON array file.
pub mod cli;
pub mod config;
pub mod context;
pub mod core;
pub mod lock;
pub mod monitor;
pub mod sampling;
pub mod shutdown;
pub mod store;

// Re-export core types for convenience
pub use crate::core::*;

use chrono::Utc;
use sampling::{
    sample_cpu, sample_disks, sample_host_info, sample_memory, sample_network,
    sample_top_processes,
};

/// Format of the `timestamp` field of an entry.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The current UTC time as `YYYY-MM-DD HH:MM:SS`.
pub fn current_timestamp() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Helper function to build an entry stamped with the current time.
pub fn build_entry(
    mode: Mode,
    source: &dyn MetricsSource,
    github_context: &GithubContext,
) -> Entry {
    build_entry_at(current_timestamp(), mode, source, github_context)
}

/// Builds an entry with an explicit timestamp.
///
/// Minimal mode samples cpu, memory and disk. Extended and full modes also
/// sample host info, network interfaces and the top processes.
pub fn build_entry_at(
    timestamp: String,
    mode: Mode,
    source: &dyn MetricsSource,
    github_context: &GithubContext,
) -> Entry {
    let extended = mode.collects_extended().then(|| ExtendedSnapshot {
        info: sample_host_info(source),
        network: sample_network(source),
        top_processes: sample_top_processes(source),
    });

    Entry {
        timestamp,
        github_context: github_context.clone(),
        system: SystemSnapshot {
            cpu: sample_cpu(source),
            memory: sample_memory(source),
            disk: sample_disks(source),
            extended,
        },
    }
}
