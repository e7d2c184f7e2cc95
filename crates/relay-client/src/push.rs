use eventsource_stream::Eventsource;
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::error::ClientError;

/// Pretty-print a JSON payload; anything else is shown as received.
pub fn render_payload(data: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(data) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| data.to_string()),
        Err(_) => data.to_string(),
    }
}

/// Subscribe to the event stream at `url` and write each event to `output`.
///
/// Returns the number of events written once the server ends the stream or
/// `max_events` have been received.
pub async fn run_push<W>(url: &str, max_events: Option<u64>, mut output: W) -> Result<u64, ClientError>
where
    W: AsyncWrite + Unpin,
{
    let resp = reqwest::get(url).await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(ClientError::Status(status.as_u16()));
    }
    info!(url, "subscribed to push stream");

    let mut events = resp.bytes_stream().eventsource();
    let mut received = 0u64;
    while let Some(event) = events.next().await {
        let event = event.map_err(|e| ClientError::Stream(e.to_string()))?;
        // keep-alive comments arrive with no data
        if event.data.is_empty() {
            continue;
        }
        output.write_all(render_payload(&event.data).as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;

        received += 1;
        if max_events.is_some_and(|max| received >= max) {
            break;
        }
    }
    debug!(received, "push stream finished");
    Ok(received)
}
