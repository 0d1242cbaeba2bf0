//! Metric samplers.
//!
//! Each sampler turns raw readings from a [`MetricsSource`] into one
//! serializable fragment of an entry. Samplers never propagate errors: a
//! source that cannot be read is logged and replaced with a sentinel so the
//! remaining groups are still collected.

pub mod cpu;
pub mod system;

use crate::core::{
    CpuSnapshot, CpuUsage, DiskSnapshot, HostInfo, MemorySnapshot, MetricsSource,
    NetworkInterface, ProcessSnapshot,
};
use log::warn;
use thiserror::Error;

pub use system::SysinfoSource;

/// Filesystem types reported by the disk sampler.
pub const SUPPORTED_FILESYSTEMS: &[&str] = &["ext2", "ext3", "ext4", "xfs", "btrfs"];

/// Number of processes kept by the top process sampler.
pub const TOP_PROCESS_COUNT: usize = 5;

/// Errors raised while reading a raw metric source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to read {what}: {source}")]
    Io {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse metric source: {0}")]
    Parse(String),

    #[error("{0} is not available on this platform")]
    Unsupported(&'static str),
}

/// Rounds to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `used / total * 100`, rounded to two decimals. Zero when `total` is zero.
pub fn memory_usage_percent(total: u64, used: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(used as f64 / total as f64 * 100.0)
}

/// Parses a `df` style percentage such as `"42%"`.
pub fn parse_percent(raw: &str) -> Option<u32> {
    raw.trim().trim_end_matches('%').trim().parse().ok()
}

/// Samples core count, model, load averages and the CPU usage percentage.
pub fn sample_cpu(source: &dyn MetricsSource) -> Option<CpuSnapshot> {
    let result = (|| {
        let info = source.cpu_info()?;
        let load = source.load_average()?;
        let counters = source.cpu_counters()?;
        Ok::<_, SourceError>(CpuSnapshot {
            cores: info.cores.max(1),
            model: info.model,
            load,
            current_usage: CpuUsage {
                usage_percent: round2(counters.lifetime_usage()),
            },
        })
    })();

    match result {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!("CPU metrics unavailable: {}", e);
            None
        }
    }
}

pub fn sample_memory(source: &dyn MetricsSource) -> Option<MemorySnapshot> {
    match source.memory() {
        Ok(mem) => Some(MemorySnapshot {
            total_bytes: mem.total,
            used_bytes: mem.used,
            free_bytes: mem.free,
            available_bytes: mem.available,
            usage_percent: memory_usage_percent(mem.total, mem.used),
        }),
        Err(e) => {
            warn!("Memory metrics unavailable: {}", e);
            None
        }
    }
}

/// Samples every mounted filesystem of a supported type, in source order.
pub fn sample_disks(source: &dyn MetricsSource) -> Vec<DiskSnapshot> {
    let filesystems = match source.filesystems() {
        Ok(filesystems) => filesystems,
        Err(e) => {
            warn!("Disk metrics unavailable: {}", e);
            return Vec::new();
        }
    };

    filesystems
        .into_iter()
        .filter(|fs| SUPPORTED_FILESYSTEMS.contains(&fs.fs_type.as_str()))
        .map(|fs| {
            let use_percentage = parse_percent(&fs.use_percent).unwrap_or_else(|| {
                warn!(
                    "Unparseable use percentage '{}' for {}",
                    fs.use_percent, fs.mount_point
                );
                0
            });
            DiskSnapshot {
                filesystem: fs.device,
                size_bytes: fs.size,
                used_bytes: fs.used,
                available_bytes: fs.available,
                use_percentage,
                mounted_on: fs.mount_point,
            }
        })
        .collect()
}

pub fn sample_host_info(source: &dyn MetricsSource) -> Option<HostInfo> {
    source
        .host_info()
        .map_err(|e| warn!("Host info unavailable: {}", e))
        .ok()
}

pub fn sample_network(source: &dyn MetricsSource) -> Vec<NetworkInterface> {
    source.network_interfaces().unwrap_or_else(|e| {
        warn!("Network metrics unavailable: {}", e);
        Vec::new()
    })
}

/// The five processes with the highest CPU percentage, highest first.
pub fn sample_top_processes(source: &dyn MetricsSource) -> Vec<ProcessSnapshot> {
    let mut processes = match source.processes() {
        Ok(processes) => processes,
        Err(e) => {
            warn!("Process metrics unavailable: {}", e);
            return Vec::new();
        }
    };

    processes.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
    processes
        .into_iter()
        .take(TOP_PROCESS_COUNT)
        .map(|p| ProcessSnapshot {
            pid: p.pid,
            cpu: round2(p.cpu_percent),
            mem: round2(p.mem_percent),
            user: p.user,
            command: p.command,
        })
        .collect()
}
