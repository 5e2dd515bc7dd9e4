//! Metric batch delivery with pluggable sinks.
//!
//! Every [`Publisher`] receives every batch the collector manager produces
//! (see [`manager::PublisherManager`]). Built-in sinks write text lines to
//! the console and submit datums to Amazon CloudWatch.

pub mod error;
pub mod manager;
pub mod sigv4;
pub mod sinks;
pub mod utils;


use anyhow::{Context, Result};
use async_trait::async_trait;
use metal_common::types::Metrics;
use serde::Deserialize;
use sinks::{CloudWatchPublisher, CloudWatchSettings, ConsolePublisher, ConsoleSettings};
use std::sync::Arc;

/// A sink that renders or transmits metric batches to an external system.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Delivers one batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be delivered at all. Sinks
    /// that submit in several calls log per-call failures themselves.
    async fn publish(&self, metrics: &Metrics) -> Result<()>;

    /// Returns the sink name (e.g., `"console"`, `"cloudwatch"`).
    fn name(&self) -> &str;
}

/// Sink selection, the `[publishers]` table of the agent config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublisherSettings {
    #[serde(default)]
    pub console: ConsoleSettings,
    #[serde(default)]
    pub cloudwatch: CloudWatchSettings,
}

/// Builds the enabled sinks.
///
/// # Errors
///
/// Fails when CloudWatch is enabled but its endpoint or credentials cannot
/// be resolved.
pub fn publishers_from_settings(settings: &PublisherSettings) -> Result<Vec<Arc<dyn Publisher>>> {
    let mut publishers: Vec<Arc<dyn Publisher>> = Vec::new();
    if settings.console.enabled {
        publishers.push(Arc::new(ConsolePublisher::stdout()));
    }
    if settings.cloudwatch.enabled {
        let cloudwatch = CloudWatchPublisher::from_settings(&settings.cloudwatch)
            .context("Failed to configure CloudWatch publisher")?;
        tracing::info!(
            region = %settings.cloudwatch.region,
            namespace = %settings.cloudwatch.namespace,
            "CloudWatch publisher enabled"
        );
        publishers.push(Arc::new(cloudwatch));
    }
    Ok(publishers)
}
