use crate::source::{CpuTimes, SnapshotSource};
use crate::tick::{read_snapshot, SnapshotState, TickOptions, Ticker};
use crate::Collector;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metal_common::types::{Metric, Metrics};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Emits the share of CPU time spent in each category between two ticks.
pub struct CpuCollector {
    source: Arc<dyn SnapshotSource>,
    options: TickOptions,
}

impl CpuCollector {
    pub fn new(source: Arc<dyn SnapshotSource>, options: TickOptions) -> Self {
        Self { source, options }
    }
}

#[async_trait]
impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    async fn collect(&self, stop: CancellationToken) -> Metrics {
        let mut state = SnapshotState::new();
        let mut metrics = Metrics::new();
        let mut ticker = Ticker::new(self.options.tick_interval);

        while let Some(now) = ticker.next(&stop).await {
            let source = Arc::clone(&self.source);
            let Some(times) =
                read_snapshot(self.name(), self.options.read_timeout, move || source.cpu_times())
                    .await
            else {
                continue;
            };

            state.advance(times);
            if let Some((previous, latest)) = state.pair() {
                metrics.extend(cpu_metrics(previous, latest, now));
            }
        }

        metrics
    }
}

/// Per-category percentages of the CPU time elapsed between two snapshots.
///
/// The denominator is the summed delta of all ten categories. When it is
/// zero every category reports 0.
pub fn cpu_metrics(previous: &CpuTimes, latest: &CpuTimes, now: DateTime<Utc>) -> Vec<Metric> {
    let delta = latest.delta(previous);
    let total = delta.total();

    [
        ("CPUUser", delta.user),
        ("CPUSystem", delta.system),
        ("CPUIdle", delta.idle),
        ("CPUNice", delta.nice),
        ("CPUIowait", delta.iowait),
        ("CPUIrq", delta.irq),
        ("CPUSoftirq", delta.softirq),
        ("CPUSteal", delta.steal),
        ("CPUGuest", delta.guest),
        ("CPUGuestNice", delta.guest_nice),
    ]
    .into_iter()
    .map(|(name, ticks)| Metric::new(name, now, percent(ticks, total)))
    .collect()
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::testing::{fast_ticks, ScriptedSource};

    fn times(user: u64, system: u64, idle: u64, iowait: u64, steal: u64) -> CpuTimes {
        CpuTimes {
            user,
            system,
            idle,
            iowait,
            steal,
            ..Default::default()
        }
    }

    #[test]
    fn percentages_sum_to_one_hundred() {
        let previous = CpuTimes {
            user: 100,
            nice: 3,
            system: 50,
            idle: 1000,
            iowait: 7,
            irq: 1,
            softirq: 2,
            steal: 4,
            guest: 9,
            guest_nice: 1,
        };
        let latest = CpuTimes {
            user: 173,
            nice: 5,
            system: 91,
            idle: 1733,
            iowait: 19,
            irq: 2,
            softirq: 9,
            steal: 4,
            guest: 12,
            guest_nice: 2,
        };

        let metrics = cpu_metrics(&previous, &latest, Utc::now());
        assert_eq!(metrics.len(), 10);
        let sum: f64 = metrics.iter().map(|m| m.value).sum();
        assert!((sum - 100.0).abs() < 1e-9, "sum was {sum}");
    }

    #[test]
    fn emits_every_category_name() {
        let metrics = cpu_metrics(&times(0, 0, 0, 0, 0), &times(1, 1, 1, 1, 1), Utc::now());
        let names: Vec<&str> = metrics.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "CPUUser",
                "CPUSystem",
                "CPUIdle",
                "CPUNice",
                "CPUIowait",
                "CPUIrq",
                "CPUSoftirq",
                "CPUSteal",
                "CPUGuest",
                "CPUGuestNice",
            ]
        );
        assert!(metrics.iter().all(|m| m.tags.is_empty()));
    }

    #[test]
    fn computes_share_of_each_category() {
        let metrics = cpu_metrics(&times(0, 0, 0, 0, 0), &times(25, 25, 50, 0, 0), Utc::now());
        assert_eq!(metrics[0].value, 25.0);
        assert_eq!(metrics[1].value, 25.0);
        assert_eq!(metrics[2].value, 50.0);
        assert_eq!(metrics[3].value, 0.0);
    }

    #[test]
    fn duplicate_snapshots_yield_zero_not_nan() {
        let snapshot = times(10, 20, 30, 40, 50);
        let metrics = cpu_metrics(&snapshot, &snapshot, Utc::now());
        assert!(metrics.iter().all(|m| m.value == 0.0));
        assert!(metrics.iter().all(|m| m.value.is_finite()));
    }

    #[tokio::test]
    async fn first_tick_emits_nothing_then_one_set_per_tick() {
        let stop = CancellationToken::new();
        let source = ScriptedSource::new(3, stop.clone()).with_cpu(vec![
            Ok(times(0, 0, 0, 0, 0)),
            Ok(times(10, 10, 80, 0, 0)),
            Ok(times(30, 20, 150, 0, 0)),
        ]);
        let collector = CpuCollector::new(Arc::new(source), fast_ticks());

        let metrics = collector.collect(stop).await;

        assert_eq!(metrics.len(), 20);
        assert_eq!(metrics.data[0].name, "CPUUser");
        assert_eq!(metrics.data[0].value, 10.0);
        assert_eq!(metrics.data[10].value, 20.0);
    }

    #[tokio::test]
    async fn failed_read_keeps_previous_snapshot() {
        let stop = CancellationToken::new();
        let source = ScriptedSource::new(3, stop.clone()).with_cpu(vec![
            Ok(times(0, 0, 0, 0, 0)),
            Err(SourceError::parse("/proc/stat", "truncated")),
            Ok(times(50, 0, 50, 0, 0)),
        ]);
        let collector = CpuCollector::new(Arc::new(source), fast_ticks());

        let metrics = collector.collect(stop).await;

        assert_eq!(metrics.len(), 10);
        assert_eq!(metrics.data[0].value, 50.0);
        assert_eq!(metrics.data[2].value, 50.0);
    }

    #[tokio::test]
    async fn single_tick_window_is_empty() {
        let stop = CancellationToken::new();
        let source = ScriptedSource::new(1, stop.clone()).with_cpu(vec![Ok(times(1, 1, 1, 1, 1))]);
        let collector = CpuCollector::new(Arc::new(source), fast_ticks());

        assert!(collector.collect(stop).await.is_empty());
    }
}
