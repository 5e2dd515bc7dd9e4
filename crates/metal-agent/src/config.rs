use anyhow::Context;
use metal_collector::bus::DEFAULT_BUS_CAPACITY;
use metal_collector::tick::TickOptions;
use metal_collector::CollectorSettings;
use metal_publisher::PublisherSettings;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Window length used when `/collect` has no `seconds` parameter.
    #[serde(default = "default_window_secs")]
    pub default_window_secs: u64,
    #[serde(default = "default_min_window_secs")]
    pub min_window_secs: u64,
    /// Runs one window right after startup when set.
    #[serde(default)]
    pub startup_window_secs: Option<u64>,
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub collectors: CollectorSettings,
    #[serde(default)]
    pub publishers: PublisherSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Upper bound on a single counter read before the tick is skipped.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_http_port() -> u16 {
    8080
}

fn default_window_secs() -> u64 {
    60
}

fn default_min_window_secs() -> u64 {
    10
}

fn default_bus_capacity() -> usize {
    DEFAULT_BUS_CAPACITY
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_read_timeout_ms() -> u64 {
    3000
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl CollectionConfig {
    pub fn tick_options(&self) -> TickOptions {
        TickOptions {
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            read_timeout: Duration::from_millis(self.read_timeout_ms.max(1)),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            default_window_secs: default_window_secs(),
            min_window_secs: default_min_window_secs(),
            startup_window_secs: None,
            bus_capacity: default_bus_capacity(),
            collection: CollectionConfig::default(),
            collectors: CollectorSettings::default(),
            publishers: PublisherSettings::default(),
        }
    }
}

impl AgentConfig {
    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.default_window_secs < self.min_window_secs {
            anyhow::bail!(
                "default_window_secs ({}) is below min_window_secs ({})",
                self.default_window_secs,
                self.min_window_secs
            );
        }
        if let Some(secs) = self.startup_window_secs {
            if secs < self.min_window_secs {
                anyhow::bail!(
                    "startup_window_secs ({secs}) is below min_window_secs ({})",
                    self.min_window_secs
                );
            }
        }
        Ok(())
    }
}
