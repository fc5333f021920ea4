//! Queue wallboard - PureCloud queue statistics poller
//!
//! Polls the PureCloud analytics API for per-queue statistics on a fixed
//! period and keeps one row per (queue, media type) current in SQLite.
//!
//! Module structure:
//! - `domain/` - Core types (keys, interval, stat row, metric schema)
//! - `io/` - External interfaces (analytics API, SQLite store, Prometheus)
//! - `services/` - Polling logic (query builder, reconciler, poller)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use queue_wallboard::infra::{Config, Metrics};
use queue_wallboard::io::{AnalyticsApi, PureCloudClient, SqliteStore};
use queue_wallboard::services::Poller;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Queue wallboard - PureCloud queue statistics poller
#[derive(Parser, Debug)]
#[command(name = "queue-wallboard", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,

    /// Emit logs as JSON lines instead of human-readable text
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for per-row reconcile output
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(git_hash = %env!("GIT_HASH"), "queue-wallboard starting");

    // Invalid configuration is fatal; there are no defaults for credentials or queues
    let config = Config::from_file(&args.config)?;

    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        region = %config.region(),
        granularity = %config.granularity(),
        frequency_secs = %config.poll_frequency_secs(),
        queues = %config.queue_ids().len(),
        database = %config.database_path(),
        table = %config.table(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    let mut store = SqliteStore::open(config.database_path(), config.table())
        .with_context(|| format!("Failed to open database {}", config.database_path()))?;

    let client = PureCloudClient::login(
        config.region(),
        config.client_id(),
        config.client_secret(),
        config.request_timeout(),
    )
    .await
    .context("PureCloud login failed")?;

    let queue_names = client.list_queues().await.context("Failed to list queues")?;
    let unnamed = config.queue_ids().iter().filter(|id| !queue_names.contains_key(*id)).count();
    if unnamed > 0 {
        warn!(unnamed = %unnamed, "tracked_queues_not_listed");
    }

    store
        .prepare_table(config.queue_ids(), &queue_names)
        .context("Failed to prepare stat table")?;

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics = Arc::new(Metrics::new());
    let poller = Poller::new(&config, client, store, metrics.clone())
        .context("Failed to build poller")?;

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_site = config.site_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = queue_wallboard::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_site,
                prom_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "Prometheus metrics server error");
            }
        });
    }

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        // First tick fires immediately; skip the empty report
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Run poller until shutdown; an in-flight cycle finishes first
    poller.run(shutdown_rx).await;

    metrics.report().log();
    info!("queue-wallboard shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_log_format() {
        let args = Args::try_parse_from(["queue-wallboard", "--config", "a.toml", "--log-json"]).unwrap();
        assert_eq!(args.config, "a.toml");
        assert!(args.log_json);

        let args = Args::try_parse_from(["queue-wallboard", "-c", "b.toml"]).unwrap();
        assert_eq!(args.config, "b.toml");
    }
}
