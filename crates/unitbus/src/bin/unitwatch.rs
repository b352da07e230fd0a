//! unitwatch: print unit state changes as JSON lines.
//!
//! Connects to a manager bridge, subscribes to unit signals, and writes one
//! JSON object per state update to stdout. Errors and reload events are logged.
//!
//! # Usage
//!
//! ```bash
//! # Local IPC bridge with default config
//! unitwatch
//!
//! # Custom config and a one-off property query
//! unitwatch --config unitbus.toml --property Version
//!
//! # Remote bridge via environment overrides
//! UNITBUS_BUS_SIGNALS=tcp://10.0.0.2:7100 UNITBUS_BUS_METHODS=tcp://10.0.0.2:7101 unitwatch
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;

use unitbus::{Conn, UnitBusConfig};

/// Watch unit state changes on a manager bus.
#[derive(Parser, Debug)]
#[command(name = "unitwatch", version, about)]
struct Cli {
    /// Path to the unitbus configuration file (defaults apply if missing).
    #[arg(long, env = "UNITBUS_CONFIG", default_value = "config/unitbus.toml")]
    config: String,

    /// Capacity of the update channel.
    #[arg(long, default_value_t = 64)]
    update_buffer: usize,

    /// Print this manager property and exit.
    #[arg(long)]
    property: Option<String>,

    /// Interval in seconds between metrics log lines (0 = disabled).
    #[arg(long, default_value_t = 60)]
    metrics_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(?cli, "starting unitwatch");

    let config = if Path::new(&cli.config).exists() {
        UnitBusConfig::from_file(&cli.config)
            .with_context(|| format!("loading {}", cli.config))?
    } else {
        tracing::debug!(path = %cli.config, "config file not found, using defaults");
        UnitBusConfig::from_env()?
    };

    let conn = Conn::connect(&config).await.context("connecting to bus")?;

    if let Some(prop) = &cli.property {
        let value = conn.manager_property(prop).await?;
        println!("{value}");
        conn.close().await;
        return Ok(());
    }

    let (update_tx, mut update_rx) = mpsc::channel(cli.update_buffer.max(1));
    let (error_tx, mut error_rx) = mpsc::channel(1);
    let (reload_tx, mut reload_rx) = mpsc::channel(1);
    conn.set_sub_state_subscriber(update_tx, error_tx, reload_tx)
        .await;
    conn.subscribe().await.context("subscribing to unit signals")?;

    let mut metrics_tick = tokio::time::interval(Duration::from_secs(cli.metrics_interval.max(1)));
    metrics_tick.tick().await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(update) = update_rx.recv() => {
                println!("{}", serde_json::to_string(&update)?);
            }
            Some(err) = error_rx.recv() => {
                tracing::warn!(error = %err, "subscriber error");
            }
            Some(()) = reload_rx.recv() => {
                tracing::info!("unit files reloaded");
            }
            _ = metrics_tick.tick(), if cli.metrics_interval > 0 => {
                tracing::info!(metrics = ?conn.metrics(), "dispatch metrics");
            }
            _ = conn.stopped() => {
                tracing::warn!("signal connection closed");
                break;
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received");
                break;
            }
            else => break,
        }
    }

    if let Err(e) = conn.unsubscribe().await {
        tracing::debug!(error = %e, "unsubscribe failed during shutdown");
    }
    conn.close().await;
    tracing::info!("unitwatch exited cleanly");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for ctrl_c");
    }
}
