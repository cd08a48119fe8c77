//! # ridesignal
//!
//! Real-time signaling server for ride requests, driver notifications,
//! private rider/driver chat and ride cancellation.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ridesignal_server::{AcceptAnyIdentity, ServerConfig};
use ridesignal_settings::{load_settings_from_path, settings_path, SignalSettings};
use ridesignal_telemetry::{init_telemetry, TelemetryConfig};

/// Ride signaling server.
#[derive(Parser, Debug)]
#[command(name = "ridesignal", about = "Ride request signaling server")]
struct Cli {
    /// Settings file (defaults to `~/.ridesignal/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log level (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, settings: &mut SignalSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    let logging = &settings.logging;
    let telemetry = init_telemetry(TelemetryConfig::from_levels(
        &logging.level,
        logging
            .module_levels
            .iter()
            .map(|(module, level)| (module.as_str(), level.as_str())),
        logging.json,
    ));
    tracing::info!(settings = %path.display(), "Starting ridesignal");

    let handle = ridesignal_server::start(
        ServerConfig::from_settings(&settings),
        telemetry.metrics(),
        Arc::new(AcceptAnyIdentity),
    )
    .await
    .context("Failed to start server")?;

    tracing::info!(port = handle.port, "ridesignal ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    handle.shutdown().await;
    Ok(())
}
