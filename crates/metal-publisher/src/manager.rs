use crate::Publisher;
use metal_collector::bus::MetricsBus;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Runs every publisher as its own task fed from the metrics bus.
pub struct PublisherManager {
    publishers: Vec<Arc<dyn Publisher>>,
}

impl PublisherManager {
    pub fn new(publishers: Vec<Arc<dyn Publisher>>) -> Self {
        Self { publishers }
    }

    pub fn publisher_names(&self) -> Vec<&str> {
        self.publishers.iter().map(|p| p.name()).collect()
    }

    /// Subscribes each publisher to `bus` and spawns its delivery loop.
    ///
    /// Subscriptions are taken before this returns, so no batch published
    /// afterwards is missed. Each task ends once the bus is closed and its
    /// queue drained.
    pub fn spawn(&self, bus: &MetricsBus) -> Vec<JoinHandle<()>> {
        self.publishers
            .iter()
            .map(|publisher| {
                let publisher = Arc::clone(publisher);
                let mut rx = bus.subscribe();
                tokio::spawn(async move {
                    tracing::info!(publisher = publisher.name(), "Publisher started");
                    while let Some(batch) = rx.recv().await {
                        match publisher.publish(&batch).await {
                            Ok(()) => tracing::debug!(
                                publisher = publisher.name(),
                                count = batch.len(),
                                "Batch published"
                            ),
                            Err(e) => tracing::error!(
                                publisher = publisher.name(),
                                error = %e,
                                "Failed to publish batch"
                            ),
                        }
                    }
                    tracing::info!(publisher = publisher.name(), "Publisher stopped");
                })
            })
            .collect()
    }
}
