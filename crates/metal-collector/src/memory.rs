use crate::source::{MemoryStats, SnapshotSource};
use crate::tick::{read_snapshot, TickOptions, Ticker};
use crate::Collector;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metal_common::types::{Metric, Metrics};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Memory is a gauge: every successful read is reported as-is, including the
/// first tick of a window.
pub struct MemoryCollector {
    source: Arc<dyn SnapshotSource>,
    options: TickOptions,
}

impl MemoryCollector {
    pub fn new(source: Arc<dyn SnapshotSource>, options: TickOptions) -> Self {
        Self { source, options }
    }
}

#[async_trait]
impl Collector for MemoryCollector {
    fn name(&self) -> &str {
        "memory"
    }

    async fn collect(&self, stop: CancellationToken) -> Metrics {
        let mut metrics = Metrics::new();
        let mut ticker = Ticker::new(self.options.tick_interval);

        while let Some(now) = ticker.next(&stop).await {
            let source = Arc::clone(&self.source);
            if let Some(stats) =
                read_snapshot(self.name(), self.options.read_timeout, move || source.memory()).await
            {
                metrics.extend(memory_metrics(&stats, now));
            }
        }

        metrics
    }
}

pub fn memory_metrics(stats: &MemoryStats, now: DateTime<Utc>) -> Vec<Metric> {
    vec![
        Metric::new("MemoryUsed", now, stats.used as f64),
        Metric::new("MemoryFree", now, stats.free as f64),
        Metric::new("MemoryShared", now, stats.shared as f64),
        Metric::new("MemoryBuffers", now, stats.buffers as f64),
        Metric::new("MemoryCached", now, stats.cached as f64),
        Metric::new("MemoryAvailable", now, stats.available as f64),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::testing::{fast_ticks, ScriptedSource};

    fn stats(used: u64) -> MemoryStats {
        MemoryStats {
            total: 8192,
            used,
            free: 8192 - used,
            shared: 16,
            buffers: 32,
            cached: 64,
            available: 8192 - used + 96,
        }
    }

    #[test]
    fn maps_every_gauge_field() {
        let metrics = memory_metrics(&stats(1024), Utc::now());
        let pairs: Vec<(&str, f64)> = metrics.iter().map(|m| (m.name.as_str(), m.value)).collect();
        assert_eq!(
            pairs,
            vec![
                ("MemoryUsed", 1024.0),
                ("MemoryFree", 7168.0),
                ("MemoryShared", 16.0),
                ("MemoryBuffers", 32.0),
                ("MemoryCached", 64.0),
                ("MemoryAvailable", 7264.0),
            ]
        );
    }

    #[tokio::test]
    async fn emits_on_every_tick_including_the_first() {
        let stop = CancellationToken::new();
        let source = ScriptedSource::new(2, stop.clone())
            .with_memory(vec![Ok(stats(1000)), Ok(stats(2000))]);
        let collector = MemoryCollector::new(Arc::new(source), fast_ticks());

        let metrics = collector.collect(stop).await;

        assert_eq!(metrics.len(), 12);
        assert_eq!(metrics.data[0].value, 1000.0);
        assert_eq!(metrics.data[6].value, 2000.0);
    }

    #[tokio::test]
    async fn failed_read_skips_the_tick() {
        let stop = CancellationToken::new();
        let source = ScriptedSource::new(2, stop.clone()).with_memory(vec![
            Err(SourceError::Unsupported("memory")),
            Ok(stats(3000)),
        ]);
        let collector = MemoryCollector::new(Arc::new(source), fast_ticks());

        let metrics = collector.collect(stop).await;

        assert_eq!(metrics.len(), 6);
        assert_eq!(metrics.data[0].value, 3000.0);
    }
}
