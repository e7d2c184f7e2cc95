use anyhow::Context;
use clap::Parser;
use relay_client::{run_chat, ChatExit, ClientConfig};
use relay_telemetry::{init_telemetry, LogTarget, TelemetryConfig};
use tokio::io::BufReader;
use tracing::Level;

/// Terminal chat client: stdin lines out, relayed messages printed.
#[derive(Debug, Parser)]
#[command(name = "chat-client", version)]
struct Args {
    /// Relay host (default 127.0.0.1, or RELAY_CLIENT_HOST).
    #[arg(long)]
    host: Option<String>,
    /// Relay port (default 4000, or RELAY_PORT).
    #[arg(long)]
    port: Option<u16>,
    /// Label prefixed to every line sent (or CHAT_NAME).
    #[arg(long)]
    name: Option<String>,
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
        config.chat_port = port;
    }
    if let Some(name) = args.name {
        config.label = Some(name);
    }

    let url = config.chat_url();
    let session = run_chat(
        &url,
        config.label.as_deref(),
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    );

    tokio::select! {
        result = session => {
            match result.with_context(|| format!("chat session with {url} failed"))? {
                ChatExit::ServerClosed => eprintln!("connection closed by server"),
                ChatExit::InputClosed => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {}
    }

    // the blocking stdin reader thread would otherwise keep the runtime alive
    std::process::exit(0);
}
