use crate::source::{NetCounters, SnapshotSource};
use crate::tick::{read_snapshot, SnapshotState, TickOptions, Ticker};
use crate::Collector;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metal_common::types::{Metric, Metrics};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Host-wide network traffic per tick, summed over all interfaces.
pub struct NetIoCollector {
    source: Arc<dyn SnapshotSource>,
    options: TickOptions,
}

impl NetIoCollector {
    pub fn new(source: Arc<dyn SnapshotSource>, options: TickOptions) -> Self {
        Self { source, options }
    }
}

#[async_trait]
impl Collector for NetIoCollector {
    fn name(&self) -> &str {
        "network"
    }

    async fn collect(&self, stop: CancellationToken) -> Metrics {
        let mut state = SnapshotState::new();
        let mut metrics = Metrics::new();
        let mut ticker = Ticker::new(self.options.tick_interval);

        while let Some(now) = ticker.next(&stop).await {
            let source = Arc::clone(&self.source);
            let Some(counters) =
                read_snapshot(self.name(), self.options.read_timeout, move || source.net_io()).await
            else {
                continue;
            };

            state.advance(counters);
            if let Some((previous, latest)) = state.pair() {
                metrics.extend(net_metrics(previous, latest, now));
            }
        }

        metrics
    }
}

pub fn net_metrics(previous: &NetCounters, latest: &NetCounters, now: DateTime<Utc>) -> Vec<Metric> {
    let delta = latest.delta(previous);
    vec![
        Metric::new("NetworkBytesSent", now, delta.bytes_sent as f64),
        Metric::new("NetworkBytesRecv", now, delta.bytes_recv as f64),
        Metric::new("NetworkPacketSent", now, delta.packets_sent as f64),
        Metric::new("NetworkPacketRecv", now, delta.packets_recv as f64),
    ]
}
