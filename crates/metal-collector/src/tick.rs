//! Tick loop plumbing shared by every collector.

use crate::error;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Timing knobs for a collector's tick loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOptions {
    /// Sampling period inside a window.
    pub tick_interval: Duration,
    /// Upper bound on a single counter read.
    pub read_timeout: Duration,
}

impl Default for TickOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            read_timeout: Duration::from_secs(3),
        }
    }
}

/// Periodic timer that stops yielding once the window's stop token fires.
pub struct Ticker {
    interval: Interval,
}

impl Ticker {
    /// The first tick fires one full period after creation.
    pub fn new(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }

    /// Waits for the next tick and returns its wall-clock time, or `None`
    /// once `stop` is cancelled.
    pub async fn next(&mut self, stop: &CancellationToken) -> Option<DateTime<Utc>> {
        if stop.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = stop.cancelled() => None,
            _ = self.interval.tick() => Some(Utc::now()),
        }
    }
}

/// Previous/latest snapshot pair owned by one collector for one window.
#[derive(Debug)]
pub struct SnapshotState<S> {
    previous: Option<S>,
    latest: Option<S>,
}

impl<S> SnapshotState<S> {
    pub fn new() -> Self {
        Self {
            previous: None,
            latest: None,
        }
    }

    /// Records a fresh snapshot; the old latest becomes the previous one.
    pub fn advance(&mut self, snapshot: S) {
        self.previous = self.latest.replace(snapshot);
    }

    /// Both snapshots, once two successful reads have happened.
    pub fn pair(&self) -> Option<(&S, &S)> {
        match (&self.previous, &self.latest) {
            (Some(previous), Some(latest)) => Some((previous, latest)),
            _ => None,
        }
    }

    pub fn latest(&self) -> Option<&S> {
        self.latest.as_ref()
    }
}

impl<S> Default for SnapshotState<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a blocking counter read on the blocking pool, bounded by `timeout`.
///
/// Failures and timeouts are logged and reported as `None`; the caller keeps
/// its previous snapshot and emits nothing for this tick.
pub async fn read_snapshot<S, F>(collector: &str, timeout: Duration, read: F) -> Option<S>
where
    S: Send + 'static,
    F: FnOnce() -> error::Result<S> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(read)).await {
        Ok(Ok(Ok(snapshot))) => Some(snapshot),
        Ok(Ok(Err(e))) => {
            tracing::warn!(collector, error = %e, "Counter read failed");
            None
        }
        Ok(Err(e)) => {
            tracing::error!(collector, error = %e, "Counter read task panicked");
            None
        }
        Err(_) => {
            tracing::warn!(
                collector,
                timeout_ms = timeout.as_millis() as u64,
                "Counter read timed out"
            );
            None
        }
    }
}
