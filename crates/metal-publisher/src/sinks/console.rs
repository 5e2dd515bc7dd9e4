use crate::Publisher;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metal_common::types::{Metric, Metrics};
use serde::Deserialize;
use std::io::{Stdout, Write};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleSettings {
    #[serde(default = "default_console_enabled")]
    pub enabled: bool,
}

fn default_console_enabled() -> bool {
    true
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            enabled: default_console_enabled(),
        }
    }
}

/// Writes one text line per metric.
///
/// Writes run on the blocking pool.
pub struct ConsolePublisher<W = Stdout> {
    out: Arc<Mutex<W>>,
}

impl ConsolePublisher<Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send + 'static> ConsolePublisher<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
        }
    }

    /// The writer back, or `None` while a write is still in flight.
    pub fn into_inner(self) -> Option<W> {
        Arc::try_unwrap(self.out)
            .ok()
            .map(|out| out.into_inner().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Renders `name{k1="v1"k2="v2"} value unix-seconds` with tags sorted by key.
/// The brace block is left out entirely for an untagged metric.
pub fn render_line(metric: &Metric) -> String {
    let mut line = metric.name.clone();
    let tags = metric.sorted_tags();
    if !tags.is_empty() {
        line.push('{');
        for (key, value) in tags {
            line.push_str(&format!("{key}=\"{value}\""));
        }
        line.push('}');
    }
    line.push_str(&format!(" {:.6} {}\n", metric.value, metric.unix_timestamp()));
    line
}

#[async_trait]
impl<W: Write + Send + 'static> Publisher for ConsolePublisher<W> {
    async fn publish(&self, metrics: &Metrics) -> Result<()> {
        let text: String = metrics.iter().map(render_line).collect();
        let out = Arc::clone(&self.out);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut out = out
                .lock()
                .map_err(|_| anyhow!("console output lock poisoned"))?;
            out.write_all(text.as_bytes())
                .context("Failed to write metrics to console")?;
            out.flush().context("Failed to flush console")?;
            Ok(())
        })
        .await
        .context("Console write task failed")?
    }

    fn name(&self) -> &str {
        "console"
    }
}
