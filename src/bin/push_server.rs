use anyhow::Context;
use clap::Parser;
use relay_server::PushConfig;
use relay_telemetry::{init_telemetry, TelemetryConfig};

/// Periodic Server-Sent Events demo.
#[derive(Debug, Parser)]
#[command(name = "push-server", version)]
struct Args {
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (default 4001, or PUSH_PORT).
    #[arg(long)]
    port: Option<u16>,
    /// Milliseconds between events (default 5000, or PUSH_INTERVAL_MS).
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    interval_ms: Option<u64>,
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

    let mut config = PushConfig::from_env();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(interval_ms) = args.interval_ms {
        config.interval_ms = interval_ms;
    }

    let handle = relay_server::start_push(config, telemetry.metrics())
        .await
        .context("failed to start push server")?;
    tracing::info!(port = handle.port(), "push server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}
