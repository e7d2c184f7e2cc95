//! Terminal chat client: lines in, relayed frames out.

use futures::{SinkExt, StreamExt};
use relay_core::Message;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::error::ClientError;

/// Why a chat session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatExit {
    /// The server closed the connection or the transport failed.
    ServerClosed,
    /// The line source reached end of input.
    InputClosed,
}

/// Turn one raw input line into an outgoing message.
///
/// Returns `None` for empty or whitespace-only lines.
pub fn outgoing_line(raw: &str, label: Option<&str>) -> Option<Message> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    Some(match label {
        Some(label) => Message::labeled(label, text),
        None => Message::from(text),
    })
}

/// Connect to `url` and pump lines from `input` to the server and frames
/// from the server to `output`, one per line.
pub async fn run_chat<R, W>(
    url: &str,
    label: Option<&str>,
    input: R,
    mut output: W,
) -> Result<ChatExit, ClientError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (ws, _) = connect_async(url).await?;
    info!(url, "connected to chat relay");

    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut lines = input.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(raw) = line? else {
                    debug!("input closed");
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    return Ok(ChatExit::InputClosed);
                };
                match outgoing_line(&raw, label) {
                    Some(msg) => ws_tx.send(WsMessage::Text(msg.to_string().into())).await?,
                    None => debug!("skipping empty line"),
                }
            }
            frame = ws_rx.next() => {
                let text = match frame {
                    Some(Ok(WsMessage::Text(text))) => text.to_string(),
                    Some(Ok(WsMessage::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!("server closed connection");
                        return Ok(ChatExit::ServerClosed);
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(error = %e, "connection lost");
                        return Ok(ChatExit::ServerClosed);
                    }
                };
                output.write_all(text.as_bytes()).await?;
                output.write_all(b"\n").await?;
                output.flush().await?;
            }
        }
    }
}
