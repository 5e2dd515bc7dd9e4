//! Parsers for the Linux procfs counter files.

use crate::error::{Result, SourceError};
use crate::source::{CpuTimes, DiskCounters, DiskIoCounters, MemoryStats};
use std::collections::HashMap;

/// Linux reports disk sectors in 512-byte units regardless of the device.
const SECTOR_SIZE: u64 = 512;

/// Parses the aggregate `cpu` line of `/proc/stat`.
///
/// Older kernels omit the trailing categories; missing fields read as 0.
pub fn parse_cpu_times(stat: &str) -> Result<CpuTimes> {
    let line = stat
        .lines()
        .find(|l| l.split_whitespace().next() == Some("cpu"))
        .ok_or_else(|| SourceError::parse("/proc/stat", "missing aggregate cpu line"))?;

    let fields = line
        .split_whitespace()
        .skip(1)
        .take(10)
        .map(|v| parse_u64("/proc/stat", v))
        .collect::<Result<Vec<u64>>>()?;

    if fields.len() < 4 {
        return Err(SourceError::parse(
            "/proc/stat",
            format!("expected at least 4 cpu fields, found {}", fields.len()),
        ));
    }

    let field = |i: usize| fields.get(i).copied().unwrap_or(0);
    Ok(CpuTimes {
        user: field(0),
        nice: field(1),
        system: field(2),
        idle: field(3),
        iowait: field(4),
        irq: field(5),
        softirq: field(6),
        steal: field(7),
        guest: field(8),
        guest_nice: field(9),
    })
}

/// Parses `/proc/meminfo` into byte counts.
///
/// `cached` includes reclaimable slab and `used` is
/// `total - free - buffers - cached`, the same split `free(1)` reports.
pub fn parse_meminfo(meminfo: &str) -> Result<MemoryStats> {
    let mut values: HashMap<&str, u64> = HashMap::new();
    for line in meminfo.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(amount) = rest.split_whitespace().next() else {
            continue;
        };
        let kib = parse_u64("/proc/meminfo", amount)?;
        values.insert(key.trim(), kib.saturating_mul(1024));
    }

    let required = |key: &str| {
        values
            .get(key)
            .copied()
            .ok_or_else(|| SourceError::parse("/proc/meminfo", format!("missing {key}")))
    };
    let optional = |key: &str| values.get(key).copied().unwrap_or(0);

    let total = required("MemTotal")?;
    let free = required("MemFree")?;
    let buffers = optional("Buffers");
    let cached = optional("Cached").saturating_add(optional("SReclaimable"));
    let available = values
        .get("MemAvailable")
        .copied()
        .unwrap_or_else(|| free.saturating_add(buffers).saturating_add(cached));

    Ok(MemoryStats {
        total,
        used: total
            .saturating_sub(free)
            .saturating_sub(buffers)
            .saturating_sub(cached),
        free,
        shared: optional("Shmem"),
        buffers,
        cached,
        available,
    })
}

/// Parses `/proc/diskstats`, keeping only `devices` when the list is non-empty.
///
/// Lines with fewer than the 14 classic fields are skipped.
pub fn parse_diskstats(diskstats: &str, devices: &[String]) -> Result<DiskCounters> {
    let mut counters = DiskCounters::new();
    for line in diskstats.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 14 {
            continue;
        }
        let name = fields[2];
        if !devices.is_empty() && !devices.iter().any(|d| d == name) {
            continue;
        }

        let reads = parse_u64("/proc/diskstats", fields[3])?;
        let sectors_read = parse_u64("/proc/diskstats", fields[5])?;
        let writes = parse_u64("/proc/diskstats", fields[7])?;
        let sectors_written = parse_u64("/proc/diskstats", fields[9])?;

        counters.insert(
            name.to_string(),
            DiskIoCounters {
                read_count: reads,
                write_count: writes,
                read_bytes: sectors_read.saturating_mul(SECTOR_SIZE),
                write_bytes: sectors_written.saturating_mul(SECTOR_SIZE),
            },
        );
    }
    Ok(counters)
}

fn parse_u64(what: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|e| SourceError::parse(what, format!("invalid value {value:?}: {e}")))
}
