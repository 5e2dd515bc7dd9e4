mod config;
mod http;

use anyhow::{Context, Result};
use metal_collector::bus::MetricsBus;
use metal_collector::manager::CollectorManager;
use metal_collector::source::{HostSource, SnapshotSource};
use metal_collector::collectors_from_settings;
use metal_publisher::manager::PublisherManager;
use metal_publisher::publishers_from_settings;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("metal=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());

    let config = config::AgentConfig::load(&config_path)?;
    tracing::info!(config = %config_path, http_port = config.http_port, "metal-agent starting");

    let source: Arc<dyn SnapshotSource> = Arc::new(HostSource::new());
    let collectors = collectors_from_settings(
        &config.collectors,
        source,
        config.collection.tick_options(),
    );
    let manager = CollectorManager::new(collectors);
    let trigger = manager.trigger();

    let publishers = PublisherManager::new(publishers_from_settings(&config.publishers)?);
    if publishers.publisher_names().is_empty() {
        tracing::warn!("No publisher enabled, collected metrics will be dropped");
    } else {
        tracing::info!(publishers = ?publishers.publisher_names(), "Publishers initialized");
    }

    let bus = MetricsBus::new(config.bus_capacity);
    let publisher_handles = publishers.spawn(&bus);

    let shutdown = CancellationToken::new();
    let manager_handle = tokio::spawn(manager.run(bus, shutdown.clone()));

    if let Some(secs) = config.startup_window_secs {
        match trigger.request(Duration::from_secs(secs)) {
            Ok(()) => tracing::info!(seconds = secs, "Startup collection window requested"),
            Err(e) => tracing::warn!(error = %e, "Startup collection window not started"),
        }
    }

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let app = http::router(http::AppState {
        trigger,
        default_window_secs: config.default_window_secs,
        min_window_secs: config.min_window_secs,
    });
    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {http_addr}"))?;

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_token.cancel();
    });

    tracing::info!(http = %http_addr, "metal-agent started");

    let server_token = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_token.cancelled().await })
        .await;
    if let Err(e) = &served {
        tracing::error!(error = %e, "HTTP server error");
    }

    // Stop the manager even when the server exited on its own.
    shutdown.cancel();
    if let Err(e) = manager_handle.await {
        tracing::error!(error = %e, "Collector manager task failed");
    }
    for handle in publisher_handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Publisher task failed");
        }
    }

    tracing::info!("metal-agent stopped");
    served.context("HTTP server failed")
}

/// Resolves on SIGINT or, on unix, SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down gracefully"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down gracefully"),
    }
}
