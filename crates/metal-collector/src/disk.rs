use crate::source::{DiskCounters, DiskIoCounters, SnapshotSource};
use crate::tick::{read_snapshot, TickOptions, Ticker};
use crate::Collector;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metal_common::types::{Metric, Metrics};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Per-device read/write rates, tagged with `device=<name>`.
pub struct DiskIoCollector {
    source: Arc<dyn SnapshotSource>,
    devices: Vec<String>,
    options: TickOptions,
}

impl DiskIoCollector {
    /// `devices` restricts reporting to the named block devices; empty means all.
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        devices: Vec<String>,
        options: TickOptions,
    ) -> Self {
        Self {
            source,
            devices,
            options,
        }
    }
}

#[async_trait]
impl Collector for DiskIoCollector {
    fn name(&self) -> &str {
        "disk"
    }

    async fn collect(&self, stop: CancellationToken) -> Metrics {
        // Every device seen so far this window, at its most recent value.
        let mut baseline: Option<DiskCounters> = None;
        let mut metrics = Metrics::new();
        let mut ticker = Ticker::new(self.options.tick_interval);

        while let Some(now) = ticker.next(&stop).await {
            let source = Arc::clone(&self.source);
            let devices = self.devices.clone();
            let Some(latest) = read_snapshot(self.name(), self.options.read_timeout, move || {
                source.disk_io(&devices)
            })
            .await
            else {
                continue;
            };

            match baseline.as_mut() {
                Some(previous) => {
                    metrics.extend(disk_metrics(previous, &latest, now));
                    previous.extend(latest);
                }
                None => baseline = Some(latest),
            }
        }

        metrics
    }
}

/// Deltas for every device in `latest`, sorted by device name.
///
/// A device missing from `previous` is measured against a zero baseline, so
/// its first appearance reports its absolute counters.
pub fn disk_metrics(
    previous: &DiskCounters,
    latest: &DiskCounters,
    now: DateTime<Utc>,
) -> Vec<Metric> {
    let zero = DiskIoCounters::default();
    let mut devices: Vec<&String> = latest.keys().collect();
    devices.sort();

    let mut points = Vec::with_capacity(devices.len() * 4);
    for device in devices {
        let current = &latest[device];
        let delta = current.delta(previous.get(device).unwrap_or(&zero));

        for (name, value) in [
            ("DiskReadCount", delta.read_count),
            ("DiskWriteCount", delta.write_count),
            ("DiskReadBytes", delta.read_bytes),
            ("DiskWriteBytes", delta.write_bytes),
        ] {
            points.push(Metric::new(name, now, value as f64).with_tag("device", device.as_str()));
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::testing::{fast_ticks, ScriptedSource};

    fn counters(
        read_count: u64,
        write_count: u64,
        read_bytes: u64,
        write_bytes: u64,
    ) -> DiskIoCounters {
        DiskIoCounters {
            read_count,
            write_count,
            read_bytes,
            write_bytes,
        }
    }

    fn snapshot(entries: &[(&str, DiskIoCounters)]) -> DiskCounters {
        entries
            .iter()
            .map(|(name, c)| (name.to_string(), *c))
            .collect()
    }

    fn value(metrics: &[Metric], name: &str, device: &str) -> f64 {
        metrics
            .iter()
            .find(|m| m.name == name && m.tags.get("device").map(String::as_str) == Some(device))
            .map(|m| m.value)
            .unwrap_or_else(|| panic!("no {name} for {device}"))
    }

    #[test]
    fn tags_each_metric_with_its_device() {
        let previous = snapshot(&[("sda", counters(10, 20, 4096, 8192))]);
        let latest = snapshot(&[("sda", counters(15, 21, 6144, 8192))]);

        let metrics = disk_metrics(&previous, &latest, Utc::now());

        assert_eq!(metrics.len(), 4);
        assert!(metrics.iter().all(|m| m.tags.len() == 1));
        assert_eq!(value(&metrics, "DiskReadCount", "sda"), 5.0);
        assert_eq!(value(&metrics, "DiskWriteCount", "sda"), 1.0);
        assert_eq!(value(&metrics, "DiskReadBytes", "sda"), 2048.0);
        assert_eq!(value(&metrics, "DiskWriteBytes", "sda"), 0.0);
    }

    #[test]
    fn unseen_device_uses_zero_baseline() {
        let previous = snapshot(&[("sda", counters(10, 10, 10, 10))]);
        let latest = snapshot(&[
            ("sda", counters(10, 10, 10, 10)),
            ("sdb", counters(7, 3, 3584, 1536)),
        ]);

        let metrics = disk_metrics(&previous, &latest, Utc::now());

        assert_eq!(metrics.len(), 8);
        assert_eq!(value(&metrics, "DiskReadCount", "sdb"), 7.0);
        assert_eq!(value(&metrics, "DiskWriteCount", "sdb"), 3.0);
        assert_eq!(value(&metrics, "DiskReadBytes", "sdb"), 3584.0);
        assert_eq!(value(&metrics, "DiskWriteBytes", "sdb"), 1536.0);
    }

    #[test]
    fn device_absent_from_latest_is_not_reported() {
        let previous = snapshot(&[("sda", counters(1, 1, 1, 1)), ("sdb", counters(1, 1, 1, 1))]);
        let latest = snapshot(&[("sda", counters(2, 2, 2, 2))]);

        let metrics = disk_metrics(&previous, &latest, Utc::now());
        assert!(metrics.iter().all(|m| m.tags["device"] == "sda"));
    }

    #[tokio::test]
    async fn collector_skips_first_tick_and_remembers_vanished_devices() {
        let stop = CancellationToken::new();
        let source = Arc::new(ScriptedSource::new(4, stop.clone()).with_disk(vec![
            Ok(snapshot(&[("sda", counters(100, 0, 0, 0))])),
            Ok(snapshot(&[("sda", counters(110, 0, 0, 0)), ("sdb", counters(5, 0, 0, 0))])),
            Err(SourceError::Unsupported("disk")),
            Ok(snapshot(&[("sdb", counters(9, 0, 0, 0))])),
        ]));
        let collector = DiskIoCollector::new(
            source.clone(),
            vec!["sda".into(), "sdb".into()],
            fast_ticks(),
        );

        let metrics = collector.collect(stop).await;

        // tick 2: sda + sdb, tick 4: sdb only
        assert_eq!(metrics.len(), 12);
        assert_eq!(value(&metrics.data[..8], "DiskReadCount", "sda"), 10.0);
        assert_eq!(value(&metrics.data[..8], "DiskReadCount", "sdb"), 5.0);
        assert_eq!(value(&metrics.data[8..], "DiskReadCount", "sdb"), 4.0);

        assert!(source
            .requested_devices()
            .iter()
            .all(|d| d == &vec!["sda".to_string(), "sdb".to_string()]));
    }
}
