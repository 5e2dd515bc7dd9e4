//! Collection window orchestration.
//!
//! The manager sits idle until it receives a window duration, then starts
//! every registered collector, lets them run for that long, stops them
//! together and joins exactly one result from each. The concatenated batch is
//! published on the bus once per window.

use crate::bus::MetricsBus;
use crate::error::TriggerError;
use crate::Collector;
use metal_common::types::Metrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Idle,
    Collecting,
}

#[derive(Default)]
struct WindowFlags {
    /// Set from the moment a request is accepted until its batch is published.
    pending: AtomicBool,
    collecting: AtomicBool,
}

/// Handle for requesting collection windows.
///
/// Only one window may be pending or running at a time; further requests are
/// rejected with [`TriggerError::Busy`] rather than queued.
#[derive(Clone)]
pub struct WindowTrigger {
    requests: mpsc::Sender<Duration>,
    flags: Arc<WindowFlags>,
}

impl WindowTrigger {
    pub fn request(&self, duration: Duration) -> Result<(), TriggerError> {
        if self
            .flags
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TriggerError::Busy);
        }

        match self.requests.try_send(duration) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(TriggerError::Busy),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.flags.pending.store(false, Ordering::Release);
                Err(TriggerError::Closed)
            }
        }
    }

    pub fn state(&self) -> ManagerState {
        if self.flags.collecting.load(Ordering::Acquire) {
            ManagerState::Collecting
        } else {
            ManagerState::Idle
        }
    }
}

pub struct CollectorManager {
    collectors: Vec<Arc<dyn Collector>>,
    requests: mpsc::Receiver<Duration>,
    trigger: WindowTrigger,
}

impl CollectorManager {
    pub fn new(collectors: Vec<Arc<dyn Collector>>) -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            collectors,
            requests: rx,
            trigger: WindowTrigger {
                requests: tx,
                flags: Arc::new(WindowFlags::default()),
            },
        }
    }

    pub fn trigger(&self) -> WindowTrigger {
        self.trigger.clone()
    }

    pub fn collector_names(&self) -> Vec<&str> {
        self.collectors.iter().map(|c| c.name()).collect()
    }

    /// Runs one window of `duration` and returns the joined batch.
    ///
    /// Every collector observes the same stop token, so they all stop at the
    /// same instant. A collector task that panics is logged and contributes
    /// nothing; the others are still joined.
    pub async fn collect_window(&self, duration: Duration) -> Metrics {
        let stop = CancellationToken::new();
        let mut tasks = JoinSet::new();

        for collector in &self.collectors {
            let collector = Arc::clone(collector);
            let stop = stop.clone();
            tasks.spawn(async move {
                let metrics = collector.collect(stop).await;
                (collector, metrics)
            });
        }

        tokio::time::sleep(duration).await;
        stop.cancel();

        let mut batch = Metrics::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((collector, metrics)) => {
                    tracing::debug!(
                        collector = collector.name(),
                        count = metrics.len(),
                        "Collector finished"
                    );
                    batch.append(metrics);
                }
                Err(e) => tracing::error!(error = %e, "Collector task failed"),
            }
        }
        batch
    }

    /// Serves window requests until `shutdown` fires.
    ///
    /// Shutdown is observed only while idle; a window already running is
    /// finished and published first. Dropping the bus on return lets
    /// subscribers drain and exit.
    pub async fn run(mut self, bus: MetricsBus, shutdown: CancellationToken) {
        tracing::info!(collectors = ?self.collector_names(), "Collector manager started");

        loop {
            let duration = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                request = self.requests.recv() => match request {
                    Some(duration) => duration,
                    None => break,
                },
            };

            self.trigger.flags.collecting.store(true, Ordering::Release);
            tracing::info!(duration_secs = duration.as_secs_f64(), "Collection window started");

            let batch = self.collect_window(duration).await;
            tracing::info!(count = batch.len(), "Collection window finished");
            bus.publish(batch);

            self.trigger.flags.collecting.store(false, Ordering::Release);
            self.trigger.flags.pending.store(false, Ordering::Release);
        }

        // Refuse new requests, then release any accepted but never started.
        self.requests.close();
        while let Ok(duration) = self.requests.try_recv() {
            tracing::warn!(
                duration_secs = duration.as_secs_f64(),
                "Dropping collection window requested before shutdown"
            );
        }
        self.trigger.flags.pending.store(false, Ordering::Release);

        tracing::info!("Collector manager stopped");
    }
}
