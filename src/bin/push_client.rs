use anyhow::Context;
use clap::Parser;
use relay_client::{run_push, ClientConfig};
use relay_telemetry::{init_telemetry, LogTarget, TelemetryConfig};
use tracing::Level;

/// Print events from the push server as they arrive.
#[derive(Debug, Parser)]
#[command(name = "push-client", version)]
struct Args {
    #[arg(long)]
    host: Option<String>,
    /// Push server port (default 4001, or PUSH_PORT).
    #[arg(long)]
    port: Option<u16>,
    /// Stop after this many events.
    #[arg(long)]
    count: Option<u64>,
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _telemetry = init_telemetry(TelemetryConfig {
        log_level: Level::WARN,
        json: args.json_logs,
        target: LogTarget::Stderr,
        ..Default::default()
    });

    let mut config = ClientConfig::from_env();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.push_port = port;
    }

    let url = config.push_url();
    tokio::select! {
        result = run_push(&url, args.count, tokio::io::stdout()) => {
            let received = result.with_context(|| format!("push stream from {url} failed"))?;
            tracing::info!(received, "push stream ended");
        }
        _ = tokio::signal::ctrl_c() => {}
    }
    Ok(())
}
