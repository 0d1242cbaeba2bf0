#![allow(dead_code)]
//! A fake metrics source for testing purposes.

use hostwatch::core::{
    CpuInfo, FilesystemUsage, HostInfo, LoadAverage, MemoryCounters, MetricsSource,
    NetworkInterface, ProcessSample,
};
use hostwatch::sampling::cpu::CpuCounters;
use hostwatch::sampling::SourceError;

/// Returns fixed readings. Individual groups can be made to fail.
#[derive(Debug, Clone)]
pub struct FakeMetricsSource {
    pub cpu_counters: CpuCounters,
    pub memory: MemoryCounters,
    pub fail_network: bool,
    pub fail_cpu: bool,
}

impl FakeMetricsSource {
    pub fn new() -> Self {
        Self {
            // 25% busy since boot
            cpu_counters: CpuCounters {
                user: 200,
                system: 50,
                idle: 750,
                ..Default::default()
            },
            memory: MemoryCounters {
                total: 1000,
                used: 250,
                free: 600,
                available: 750,
            },
            fail_network: false,
            fail_cpu: false,
        }
    }

    pub fn failing_network(mut self) -> Self {
        self.fail_network = true;
        self
    }

    pub fn failing_cpu(mut self) -> Self {
        self.fail_cpu = true;
        self
    }
}

impl Default for FakeMetricsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for FakeMetricsSource {
    fn cpu_counters(&self) -> Result<CpuCounters, SourceError> {
        if self.fail_cpu {
            return Err(SourceError::Parse("fake /proc/stat".into()));
        }
        Ok(self.cpu_counters)
    }

    fn cpu_info(&self) -> Result<CpuInfo, SourceError> {
        Ok(CpuInfo {
            cores: 4,
            model: "Fake CPU @ 3.00GHz".into(),
        })
    }

    fn load_average(&self) -> Result<LoadAverage, SourceError> {
        Ok(LoadAverage {
            avg_1min: 1.0,
            avg_5min: 0.5,
            avg_15min: 0.25,
        })
    }

    fn memory(&self) -> Result<MemoryCounters, SourceError> {
        Ok(self.memory)
    }

    fn filesystems(&self) -> Result<Vec<FilesystemUsage>, SourceError> {
        Ok(vec![
            FilesystemUsage {
                device: "/dev/sda1".into(),
                fs_type: "ext4".into(),
                mount_point: "/".into(),
                size: 1000,
                used: 420,
                available: 580,
                use_percent: "42%".into(),
            },
            FilesystemUsage {
                device: "tmpfs".into(),
                fs_type: "tmpfs".into(),
                mount_point: "/run".into(),
                size: 100,
                used: 1,
                available: 99,
                use_percent: "1%".into(),
            },
        ])
    }

    fn host_info(&self) -> Result<HostInfo, SourceError> {
        Ok(HostInfo {
            hostname: "runner-1".into(),
            os: "Linux 22.04 Ubuntu".into(),
            kernel: "6.5.0".into(),
            uptime_seconds: 3600,
        })
    }

    fn network_interfaces(&self) -> Result<Vec<NetworkInterface>, SourceError> {
        if self.fail_network {
            return Err(SourceError::Unsupported("network"));
        }
        Ok(vec![NetworkInterface {
            interface: "eth0".into(),
            rx_bytes: 1024,
            tx_bytes: 2048,
            rx_packets: 10,
            tx_packets: 20,
        }])
    }

    fn processes(&self) -> Result<Vec<ProcessSample>, SourceError> {
        Ok((1..=7)
            .map(|pid| ProcessSample {
                pid,
                cpu_percent: pid as f64,
                mem_percent: 0.5,
                user: "runner".into(),
                command: format!("worker --id \"{}\"", pid),
            })
            .collect())
    }
}
