//! End-to-end tests for the Server-Sent Events push server.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use relay_server::{start_push, PushConfig, ServerHandle};
use relay_telemetry::MetricsRecorder;
use serde_json::Value;
use tokio::time::timeout;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn boot_push(interval_ms: u64) -> ServerHandle {
    let config = PushConfig {
        host: "127.0.0.1".into(),
        port: 0,
        interval_ms,
        message: "Hello from server".into(),
        ..Default::default()
    };
    start_push(config, Arc::new(MetricsRecorder::new())).await.unwrap()
}

/// Read raw SSE text until `n` complete `data:` records have arrived.
async fn read_records(resp: reqwest::Response, n: usize) -> Vec<String> {
    let mut body = Box::pin(resp.bytes_stream());
    read_from(&mut body, n).await
}

/// Like `read_records`, but leaves the stream open for the caller.
async fn read_from<S, B>(body: &mut S, n: usize) -> Vec<String>
where
    S: Stream<Item = Result<B, reqwest::Error>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut buf = String::new();
    let mut records = Vec::new();

    timeout(TIMEOUT, async {
        while records.len() < n {
            let chunk = body.next().await.expect("stream ended").unwrap();
            buf.push_str(std::str::from_utf8(chunk.as_ref()).unwrap());
            while let Some(end) = buf.find("\n\n") {
                let record: String = buf.drain(..end + 2).collect();
                if let Some(data) = record.lines().find_map(|l| l.strip_prefix("data:")) {
                    records.push(data.trim_start().to_string());
                }
            }
        }
    })
    .await
    .expect("timed out waiting for events");

    records
}

#[tokio::test]
async fn events_stream_has_sse_content_type() {
    let server = boot_push(50).await;
    let url = format!("http://127.0.0.1:{}/events", server.port());

    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), 200);
    let content_type = resp.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));

    drop(resp);
    server.shutdown().await;
}

#[tokio::test]
async fn events_carry_message_and_timestamp() {
    let server = boot_push(50).await;
    let url = format!("http://127.0.0.1:{}/events", server.port());

    let resp = reqwest::get(&url).await.unwrap();
    let records = read_records(resp, 2).await;

    for raw in &records {
        let event: Value = serde_json::from_str(raw).unwrap();
        assert_eq!(event["message"], "Hello from server");
        let ts = event["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok(), "bad timestamp {ts}");
    }

    server.shutdown().await;
}

async fn subscribers(base: &str) -> u64 {
    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
    body["subscribers"].as_u64().unwrap()
}

#[tokio::test]
async fn health_counts_subscribers() {
    let server = boot_push(50).await;
    let base = format!("http://127.0.0.1:{}", server.port());

    assert_eq!(subscribers(&base).await, 0);

    let resp = reqwest::get(format!("{base}/events")).await.unwrap();
    let mut events = Box::pin(resp.bytes_stream());
    // wait for the first record so the subscription is live
    let _ = read_from(&mut events, 1).await;
    assert_eq!(subscribers(&base).await, 1);

    // the server notices the hang-up on its next write
    drop(events);
    timeout(TIMEOUT, async {
        while subscribers(&base).await != 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("subscriber never released");

    server.shutdown().await;
}

#[tokio::test]
async fn shutdown_ends_open_streams() {
    let server = boot_push(50).await;
    let url = format!("http://127.0.0.1:{}/events", server.port());
    let resp = reqwest::get(&url).await.unwrap();

    timeout(TIMEOUT, server.shutdown())
        .await
        .expect("shutdown hung with an open stream");

    let mut body = resp.bytes_stream();
    let drained = timeout(TIMEOUT, async {
        while let Some(Ok(_)) = body.next().await {}
    })
    .await;
    assert!(drained.is_ok());
}
