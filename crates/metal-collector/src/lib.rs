//! Metric collection framework for the metal agent.
//!
//! Each [`Collector`] samples one domain of OS counters (CPU, memory, disk,
//! network) on a fixed tick for the length of a collection window and hands
//! back every metric it produced. The [`manager::CollectorManager`] runs the
//! windows and publishes one batch per window on the [`bus::MetricsBus`].

pub mod bus;
pub mod cpu;
pub mod disk;
pub mod error;
pub mod manager;
pub mod memory;
pub mod network;
pub mod procfs;
pub mod source;
pub mod tick;

#[cfg(test)]
mod testing;

use async_trait::async_trait;
use metal_common::types::Metrics;
use serde::Deserialize;
use source::SnapshotSource;
use std::sync::Arc;
use tick::TickOptions;
use tokio_util::sync::CancellationToken;

/// A system metric collector for one counter domain.
///
/// `collect` runs as its own task for the duration of one window. All
/// snapshot state is created inside the call and dropped when it returns,
/// so no baseline survives from one window to the next.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Returns the collector name (e.g., `"cpu"`, `"disk"`), used for logging.
    fn name(&self) -> &str;

    /// Samples until `stop` is cancelled, then returns everything gathered
    /// since the call started.
    async fn collect(&self, stop: CancellationToken) -> Metrics;
}

/// Which collectors to register.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorSettings {
    #[serde(default = "default_enabled")]
    pub cpu: bool,
    #[serde(default = "default_enabled")]
    pub memory: bool,
    #[serde(default = "default_enabled")]
    pub disk: bool,
    #[serde(default = "default_enabled")]
    pub network: bool,
    /// Block devices to report; empty means every device in `/proc/diskstats`.
    #[serde(default)]
    pub disk_devices: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            cpu: true,
            memory: true,
            disk: true,
            network: true,
            disk_devices: Vec::new(),
        }
    }
}

/// Builds the enabled collectors, all reading from `source`.
pub fn collectors_from_settings(
    settings: &CollectorSettings,
    source: Arc<dyn SnapshotSource>,
    options: TickOptions,
) -> Vec<Arc<dyn Collector>> {
    let mut collectors: Vec<Arc<dyn Collector>> = Vec::new();

    if settings.cpu {
        collectors.push(Arc::new(cpu::CpuCollector::new(source.clone(), options)));
    }
    if settings.memory {
        collectors.push(Arc::new(memory::MemoryCollector::new(
            source.clone(),
            options,
        )));
    }
    if settings.disk {
        collectors.push(Arc::new(disk::DiskIoCollector::new(
            source.clone(),
            settings.disk_devices.clone(),
            options,
        )));
    }
    if settings.network {
        collectors.push(Arc::new(network::NetIoCollector::new(source, options)));
    }

    tracing::info!(count = collectors.len(), "Initialized collectors");
    collectors
}
