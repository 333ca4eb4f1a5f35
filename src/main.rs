//! # hydrate
//!
//! Chat gateway binary: loads settings, initializes logging and metrics,
//! serves the `WebSocket` gateway and drives graceful shutdown on Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use hydrate_server::config::ServerConfig;
use hydrate_server::server::GatewayServer;
use hydrate_settings::GatewaySettings;
use hydrate_telemetry::{TelemetryConfig, init_telemetry};

/// Hydrate chat gateway.
#[derive(Parser, Debug)]
#[command(name = "hydrate", version, about = "WebSocket chat gateway with hydration reminders")]
struct Cli {
    /// Settings file (defaults to `$HYDRATE_CONFIG` or `~/.hydrate/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Maximum live connections (overrides settings).
    #[arg(long)]
    max_connections: Option<usize>,

    /// Log level (overrides settings; `RUST_LOG` still wins).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,

    /// Do not run the hydration reminder scheduler.
    #[arg(long)]
    no_scheduler: bool,
}

impl Cli {
    /// Apply command-line flags, the highest-priority settings layer.
    fn apply(&self, settings: &mut GatewaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(max) = self.max_connections {
            settings.server.max_connections = max;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.log_json {
            settings.logging.json = true;
        }
        if self.no_scheduler {
            settings.scheduler.enabled = false;
        }
    }
}

fn load_settings(cli: &Cli) -> Result<GatewaySettings> {
    let mut settings = match &cli.config {
        Some(path) => hydrate_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => hydrate_settings::load_settings().with_context(|| {
            format!(
                "Failed to load settings from {}",
                hydrate_settings::settings_path().display()
            )
        })?,
    };
    cli.apply(&mut settings);
    settings.validate().context("Invalid command-line override")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    let telemetry = TelemetryConfig::from_names(
        &settings.logging.level,
        settings
            .logging
            .modules
            .iter()
            .map(|(module, level)| (module.as_str(), level.as_str())),
        settings.logging.json,
    );
    let _ = init_telemetry(&telemetry);

    let metrics_handle = hydrate_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let config = ServerConfig::from(&settings);
    let shutdown_timeout = config.shutdown_timeout;
    let server = GatewayServer::new(config).with_metrics(metrics_handle);
    let handle = server
        .listen()
        .await
        .with_context(|| format!("Failed to bind {}", server.config().bind_addr()))?;
    tracing::info!(addr = %handle.addr(), "hydrate gateway started");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("shutdown requested");

    let clean = server
        .shutdown()
        .graceful_shutdown(handle.into_tasks(), Some(shutdown_timeout))
        .await;
    if !clean {
        tracing::warn!("exiting with tasks still running");
    }
    Ok(())
}
