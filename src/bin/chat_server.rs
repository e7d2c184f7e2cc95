use anyhow::Context;
use clap::Parser;
use relay_server::ServerConfig;
use relay_telemetry::{init_telemetry, TelemetryConfig};

/// Broadcast chat relay over WebSocket.
#[derive(Debug, Parser)]
#[command(name = "chat-server", version)]
struct Args {
    /// Interface to bind (default 0.0.0.0, or RELAY_HOST).
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (default 4000, or RELAY_PORT).
    #[arg(long)]
    port: Option<u16>,
    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let telemetry = init_telemetry(TelemetryConfig {
        json: args.json_logs,
        ..Default::default()
    });

    let mut config = ServerConfig::from_env();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let handle = relay_server::start(config, telemetry.metrics())
        .await
        .context("failed to start chat relay")?;
    tracing::info!(port = handle.port(), "chat relay ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}
