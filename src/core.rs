//! Core domain types and the OS accessor trait for HostWatch
//!
//! This module defines the records written to the output array and the
//! trait contract that separates metric arithmetic from the operating
//! system specific code that reads raw counters.

use crate::sampling::cpu::CpuCounters;
use crate::sampling::SourceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Collection profile controlling which metric groups are sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// CPU, memory and disk only.
    #[default]
    Minimal,
    /// Minimal plus host info, network interfaces and top processes.
    Extended,
    /// Currently identical to `Extended`.
    Full,
}

impl Mode {
    /// Returns true if host info, network and process samplers run in this mode.
    pub fn collects_extended(self) -> bool {
        matches!(self, Mode::Extended | Mode::Full)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Minimal => "minimal",
            Mode::Extended => "extended",
            Mode::Full => "full",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a mode string is not one of the known profiles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown collection mode '{0}' (expected minimal, extended or full)")]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => Ok(Mode::Minimal),
            "extended" => Ok(Mode::Extended),
            "full" => Ok(Mode::Full),
            _ => Err(UnknownMode(s.to_string())),
        }
    }
}

// =============================================================================
// Entry
// =============================================================================

/// One timestamped telemetry sample appended to the output array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    /// UTC wall clock, `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
    /// Who collected the sample and for which repositories
    pub github_context: GithubContext,
    /// Mode dependent metric groups
    pub system: SystemSnapshot,
}

/// Collection context attached to every entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GithubContext {
    pub user: String,
    pub repositories: Vec<Repository>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Repository {
    /// The raw `owner/repo` token
    pub name: String,
    pub url: String,
}

/// The `system` object of an entry.
///
/// `cpu`, `memory` and `disk` are always present (cpu and memory serialize
/// as `null` when their source is unreadable). The extended groups are
/// flattened in only for the extended and full modes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemSnapshot {
    pub cpu: Option<CpuSnapshot>,
    pub memory: Option<MemorySnapshot>,
    pub disk: Vec<DiskSnapshot>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub extended: Option<ExtendedSnapshot>,
}

/// Metric groups collected only in the extended and full modes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtendedSnapshot {
    pub info: Option<HostInfo>,
    pub network: Vec<NetworkInterface>,
    pub top_processes: Vec<ProcessSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CpuSnapshot {
    pub cores: usize,
    pub model: String,
    pub load: LoadAverage,
    pub current_usage: CpuUsage,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct LoadAverage {
    pub avg_1min: f64,
    pub avg_5min: f64,
    pub avg_15min: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CpuUsage {
    /// Rounded to two decimal places
    pub usage_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemorySnapshot {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub available_bytes: u64,
    pub usage_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskSnapshot {
    pub filesystem: String,
    pub size_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub use_percentage: u32,
    pub mounted_on: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HostInfo {
    pub hostname: String,
    pub os: String,
    pub kernel: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkInterface {
    pub interface: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub cpu: f64,
    pub mem: f64,
    pub user: String,
    pub command: String,
}

// =============================================================================
// Raw OS readings
// =============================================================================

/// Static CPU description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuInfo {
    pub cores: usize,
    pub model: String,
}

/// Raw memory counters in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryCounters {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub available: u64,
}

/// One mounted filesystem as reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesystemUsage {
    /// Device or source name, e.g. `/dev/sda1`
    pub device: String,
    /// Filesystem type, e.g. `ext4`
    pub fs_type: String,
    pub mount_point: String,
    pub size: u64,
    pub used: u64,
    pub available: u64,
    /// Pre-formatted use percentage in `df` style, e.g. `"42%"`
    pub use_percent: String,
}

/// One process as reported by the OS, before ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSample {
    pub pid: u32,
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub user: String,
    pub command: String,
}

// =============================================================================
// Service Traits
// =============================================================================

/// Reads raw metrics from the operating system.
///
/// Every method is independent: a failure in one must not affect the
/// others. Implementations hold no state that samplers can observe.
pub trait MetricsSource: Send + Sync {
    /// Cumulative CPU time counters since boot.
    fn cpu_counters(&self) -> Result<CpuCounters, SourceError>;

    fn cpu_info(&self) -> Result<CpuInfo, SourceError>;

    fn load_average(&self) -> Result<LoadAverage, SourceError>;

    fn memory(&self) -> Result<MemoryCounters, SourceError>;

    /// All mounted filesystems, unfiltered.
    fn filesystems(&self) -> Result<Vec<FilesystemUsage>, SourceError>;

    fn host_info(&self) -> Result<HostInfo, SourceError>;

    fn network_interfaces(&self) -> Result<Vec<NetworkInterface>, SourceError>;

    /// All running processes, unsorted.
    fn processes(&self) -> Result<Vec<ProcessSample>, SourceError>;
}
