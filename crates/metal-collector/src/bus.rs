//! Hand-off channel between the window orchestrator and the publishers.
//!
//! Delivery is broadcast: every subscriber receives its own handle to every
//! batch. Capacity is bounded; a subscriber that falls `capacity` batches
//! behind loses the oldest ones instead of holding up the next window.

use metal_common::types::Metrics;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

pub const DEFAULT_BUS_CAPACITY: usize = 16;

#[derive(Clone)]
pub struct MetricsBus {
    sender: broadcast::Sender<Arc<Metrics>>,
}

impl MetricsBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Sends `metrics` to every current subscriber and returns how many
    /// there were. With no subscribers the batch is dropped.
    pub fn publish(&self, metrics: Metrics) -> usize {
        let count = metrics.len();
        match self.sender.send(Arc::new(metrics)) {
            Ok(subscribers) => {
                tracing::debug!(count, subscribers, "Published metric batch");
                subscribers
            }
            Err(_) => {
                tracing::warn!(count, "No publisher subscribed, dropping metric batch");
                0
            }
        }
    }

    pub fn subscribe(&self) -> BusReceiver {
        BusReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MetricsBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

pub struct BusReceiver {
    receiver: broadcast::Receiver<Arc<Metrics>>,
}

impl BusReceiver {
    /// Next batch, or `None` once every `MetricsBus` handle is dropped and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<Arc<Metrics>> {
        loop {
            match self.receiver.recv().await {
                Ok(metrics) => return Some(metrics),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Subscriber lagged behind, oldest batches dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use metal_common::types::Metric;

    fn batch(name: &str) -> Metrics {
        vec![Metric::new(name, Utc::now(), 1.0)].into_iter().collect()
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_batch() {
        let bus = MetricsBus::new(4);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.publish(batch("A")), 2);
        assert_eq!(bus.publish(batch("B")), 2);

        for rx in [&mut first, &mut second] {
            assert_eq!(rx.recv().await.unwrap().data[0].name, "A");
            assert_eq!(rx.recv().await.unwrap().data[0].name, "B");
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_drops_batch() {
        let bus = MetricsBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(batch("A")), 0);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_to_newest() {
        let bus = MetricsBus::new(2);
        let mut rx = bus.subscribe();

        for name in ["A", "B", "C", "D"] {
            bus.publish(batch(name));
        }

        assert_eq!(rx.recv().await.unwrap().data[0].name, "C");
        assert_eq!(rx.recv().await.unwrap().data[0].name, "D");
    }

    #[tokio::test]
    async fn receiver_closes_after_bus_dropped() {
        let bus = MetricsBus::new(2);
        let mut rx = bus.subscribe();
        bus.publish(batch("A"));
        drop(bus);

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
