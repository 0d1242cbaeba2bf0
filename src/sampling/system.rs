//! # System Metrics Source
//!
//! This module defines the `SysinfoSource`, the production implementation
//! of [`MetricsSource`]. It queries the host through the `sysinfo` crate and
//! reads the cumulative CPU counters straight from `/proc/stat`.
//!
//! The `System` handle is kept behind a mutex so the source can be shared
//! with blocking sampler tasks while still reusing the refreshed state.

use super::cpu::CpuCounters;
use super::SourceError;
use crate::core::{
    CpuInfo, FilesystemUsage, HostInfo, LoadAverage, MemoryCounters, MetricsSource,
    NetworkInterface, ProcessSample,
};
use log::debug;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use sysinfo::{Disks, Networks, System, Users};

/// Reads metrics from the local host.
pub struct SysinfoSource {
    system: Mutex<System>,
}

impl SysinfoSource {
    /// Creates a new `SysinfoSource`.
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn system(&self) -> MutexGuard<'_, System> {
        // A panic while holding the guard leaves `System` in a usable state.
        self.system.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentage in `df` style: rounded up and suffixed with `%`.
pub fn df_percent(used: u64, available: u64) -> String {
    let usable = used.saturating_add(available);
    if usable == 0 {
        return "-".to_string();
    }
    let percent = (used as u128 * 100).div_ceil(usable as u128);
    format!("{}%", percent)
}

/// Space figures of one mounted filesystem, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceUsage {
    pub size: u64,
    pub used: u64,
    pub available: u64,
}

impl SpaceUsage {
    /// Converts `statvfs` block counts the way `df` does: blocks reserved
    /// for root are neither used nor available.
    pub fn from_blocks(blocks: u64, free: u64, available: u64, fragment_size: u64) -> Self {
        Self {
            size: blocks.saturating_mul(fragment_size),
            used: blocks.saturating_sub(free).saturating_mul(fragment_size),
            available: available.saturating_mul(fragment_size),
        }
    }

    pub fn use_percent(&self) -> String {
        df_percent(self.used, self.available)
    }
}

#[cfg(unix)]
fn statvfs_usage(mount_point: &Path) -> Option<SpaceUsage> {
    match nix::sys::statvfs::statvfs(mount_point) {
        Ok(stat) => Some(SpaceUsage::from_blocks(
            stat.blocks() as u64,
            stat.blocks_free() as u64,
            stat.blocks_available() as u64,
            stat.fragment_size() as u64,
        )),
        Err(e) => {
            debug!("statvfs failed for {}: {}", mount_point.display(), e);
            None
        }
    }
}

#[cfg(not(unix))]
fn statvfs_usage(_mount_point: &Path) -> Option<SpaceUsage> {
    None
}

impl MetricsSource for SysinfoSource {
    #[cfg(target_os = "linux")]
    fn cpu_counters(&self) -> Result<CpuCounters, SourceError> {
        CpuCounters::read_from_proc()
    }

    #[cfg(not(target_os = "linux"))]
    fn cpu_counters(&self) -> Result<CpuCounters, SourceError> {
        Err(SourceError::Unsupported("/proc/stat"))
    }

    fn cpu_info(&self) -> Result<CpuInfo, SourceError> {
        let mut system = self.system();
        system.refresh_cpu();
        let cpus = system.cpus();
        if cpus.is_empty() {
            return Err(SourceError::Unsupported("cpu enumeration"));
        }
        Ok(CpuInfo {
            cores: cpus.len(),
            model: cpus[0].brand().trim().to_string(),
        })
    }

    fn load_average(&self) -> Result<LoadAverage, SourceError> {
        let load = System::load_average();
        Ok(LoadAverage {
            avg_1min: load.one,
            avg_5min: load.five,
            avg_15min: load.fifteen,
        })
    }

    fn memory(&self) -> Result<MemoryCounters, SourceError> {
        let mut system = self.system();
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return Err(SourceError::Unsupported("memory statistics"));
        }
        Ok(MemoryCounters {
            total,
            used: system.used_memory(),
            free: system.free_memory(),
            available: system.available_memory(),
        })
    }

    fn filesystems(&self) -> Result<Vec<FilesystemUsage>, SourceError> {
        let disks = Disks::new_with_refreshed_list();
        Ok(disks
            .iter()
            .map(|disk| {
                // sysinfo has no free-block count, so reserved blocks would count as used.
                let usage = statvfs_usage(disk.mount_point()).unwrap_or_else(|| {
                    let size = disk.total_space();
                    let available = disk.available_space();
                    SpaceUsage {
                        size,
                        used: size.saturating_sub(available),
                        available,
                    }
                });
                FilesystemUsage {
                    device: disk.name().to_string_lossy().into_owned(),
                    fs_type: disk.file_system().to_string_lossy().into_owned(),
                    mount_point: disk.mount_point().to_string_lossy().into_owned(),
                    size: usage.size,
                    used: usage.used,
                    available: usage.available,
                    use_percent: usage.use_percent(),
                }
            })
            .collect())
    }

    fn host_info(&self) -> Result<HostInfo, SourceError> {
        let hostname =
            System::host_name().ok_or(SourceError::Unsupported("host name lookup"))?;
        Ok(HostInfo {
            hostname,
            os: System::long_os_version().unwrap_or_else(|| "unknown".to_string()),
            kernel: System::kernel_version().unwrap_or_else(|| "unknown".to_string()),
            uptime_seconds: System::uptime(),
        })
    }

    fn network_interfaces(&self) -> Result<Vec<NetworkInterface>, SourceError> {
        let networks = Networks::new_with_refreshed_list();
        let mut interfaces: Vec<NetworkInterface> = networks
            .iter()
            .filter(|(name, _)| name.as_str() != "lo")
            .map(|(name, data)| NetworkInterface {
                interface: name.clone(),
                rx_bytes: data.total_received(),
                tx_bytes: data.total_transmitted(),
                rx_packets: data.total_packets_received(),
                tx_packets: data.total_packets_transmitted(),
            })
            .collect();
        interfaces.sort_by(|a, b| a.interface.cmp(&b.interface));
        Ok(interfaces)
    }

    fn processes(&self) -> Result<Vec<ProcessSample>, SourceError> {
        let mut system = self.system();
        // Per-process CPU usage needs two refreshes spaced by the minimum interval.
        system.refresh_processes();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        system.refresh_processes();

        // Denominator of the per-process memory share.
        system.refresh_memory();
        let total_memory = system.total_memory();
        let users = Users::new_with_refreshed_list();

        Ok(system
            .processes()
            .iter()
            .map(|(pid, process)| {
                let user = process
                    .user_id()
                    .and_then(|uid| users.get_user_by_id(uid))
                    .map(|user| user.name().to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                let command = if process.cmd().is_empty() {
                    process.name().to_string()
                } else {
                    process.cmd().join(" ")
                };
                let mem_percent = if total_memory > 0 {
                    process.memory() as f64 / total_memory as f64 * 100.0
                } else {
                    0.0
                };
                ProcessSample {
                    pid: pid.as_u32(),
                    cpu_percent: process.cpu_usage() as f64,
                    mem_percent,
                    user,
                    command,
                }
            })
            .collect())
    }
}
