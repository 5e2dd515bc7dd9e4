//! Raw counter snapshots and the sources that read them.
//!
//! A snapshot is an immutable record of absolute OS counter values taken at
//! one instant. Sources are pure queries; all previous/latest bookkeeping
//! lives inside the collectors.

use crate::error::{Result, SourceError};
use crate::procfs;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use sysinfo::Networks;

/// Cumulative CPU time per category, in kernel clock ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

impl CpuTimes {
    /// Field-wise `self - previous`. A counter that went backwards yields 0.
    pub fn delta(&self, previous: &CpuTimes) -> CpuTimes {
        CpuTimes {
            user: self.user.saturating_sub(previous.user),
            nice: self.nice.saturating_sub(previous.nice),
            system: self.system.saturating_sub(previous.system),
            idle: self.idle.saturating_sub(previous.idle),
            iowait: self.iowait.saturating_sub(previous.iowait),
            irq: self.irq.saturating_sub(previous.irq),
            softirq: self.softirq.saturating_sub(previous.softirq),
            steal: self.steal.saturating_sub(previous.steal),
            guest: self.guest.saturating_sub(previous.guest),
            guest_nice: self.guest_nice.saturating_sub(previous.guest_nice),
        }
    }

    /// Sum of all ten categories.
    pub fn total(&self) -> u64 {
        [
            self.user,
            self.system,
            self.idle,
            self.nice,
            self.iowait,
            self.irq,
            self.softirq,
            self.steal,
            self.guest,
            self.guest_nice,
        ]
        .iter()
        .fold(0u64, |acc, v| acc.saturating_add(*v))
    }
}

/// Instantaneous memory usage in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub shared: u64,
    pub buffers: u64,
    pub cached: u64,
    pub available: u64,
}

/// Cumulative I/O counters of one block device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskIoCounters {
    pub read_count: u64,
    pub write_count: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

impl DiskIoCounters {
    pub fn delta(&self, previous: &DiskIoCounters) -> DiskIoCounters {
        DiskIoCounters {
            read_count: self.read_count.saturating_sub(previous.read_count),
            write_count: self.write_count.saturating_sub(previous.write_count),
            read_bytes: self.read_bytes.saturating_sub(previous.read_bytes),
            write_bytes: self.write_bytes.saturating_sub(previous.write_bytes),
        }
    }
}

/// Per-device disk counters keyed by device name (e.g. `sda`).
pub type DiskCounters = HashMap<String, DiskIoCounters>;

/// Host-wide network counters summed over every interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

impl NetCounters {
    pub fn delta(&self, previous: &NetCounters) -> NetCounters {
        NetCounters {
            bytes_sent: self.bytes_sent.saturating_sub(previous.bytes_sent),
            bytes_recv: self.bytes_recv.saturating_sub(previous.bytes_recv),
            packets_sent: self.packets_sent.saturating_sub(previous.packets_sent),
            packets_recv: self.packets_recv.saturating_sub(previous.packets_recv),
        }
    }
}

/// Reads OS counters for every supported domain.
///
/// Calls may block on the filesystem, so collectors run them on the blocking
/// thread pool under a timeout.
pub trait SnapshotSource: Send + Sync {
    fn cpu_times(&self) -> Result<CpuTimes>;

    fn memory(&self) -> Result<MemoryStats>;

    /// Reads disk counters, restricted to `devices` unless the slice is empty.
    fn disk_io(&self, devices: &[String]) -> Result<DiskCounters>;

    fn net_io(&self) -> Result<NetCounters>;
}

/// Counter source backed by procfs, with network totals from `sysinfo`.
pub struct HostSource {
    proc_root: PathBuf,
}

impl HostSource {
    pub fn new() -> Self {
        Self::with_proc_root("/proc")
    }

    /// Reads procfs files below `root` instead of `/proc`.
    pub fn with_proc_root(root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: root.into(),
        }
    }

    fn read(&self, relative: &str) -> Result<String> {
        let path = self.proc_root.join(relative);
        read_file(&path)
    }
}

impl Default for HostSource {
    fn default() -> Self {
        Self::new()
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.display().to_string(),
        source,
    })
}

impl SnapshotSource for HostSource {
    fn cpu_times(&self) -> Result<CpuTimes> {
        procfs::parse_cpu_times(&self.read("stat")?)
    }

    fn memory(&self) -> Result<MemoryStats> {
        procfs::parse_meminfo(&self.read("meminfo")?)
    }

    fn disk_io(&self, devices: &[String]) -> Result<DiskCounters> {
        procfs::parse_diskstats(&self.read("diskstats")?, devices)
    }

    fn net_io(&self) -> Result<NetCounters> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(SourceError::Unsupported("network"));
        }

        let networks = Networks::new_with_refreshed_list();
        let mut counters = NetCounters::default();
        for (_name, data) in networks.iter() {
            counters.bytes_sent = counters.bytes_sent.saturating_add(data.total_transmitted());
            counters.bytes_recv = counters.bytes_recv.saturating_add(data.total_received());
            counters.packets_sent = counters
                .packets_sent
                .saturating_add(data.total_packets_transmitted());
            counters.packets_recv = counters
                .packets_recv
                .saturating_add(data.total_packets_received());
        }
        Ok(counters)
    }
}
