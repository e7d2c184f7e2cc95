//! End-to-end relay tests using real WebSocket clients.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use relay_server::{start, ServerConfig, ServerHandle};
use relay_telemetry::MetricsRecorder;
use serde_json::Value;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn boot_server() -> (ServerHandle, Arc<MetricsRecorder>) {
    boot_with(ServerConfig::default()).await
}

async fn boot_with(config: ServerConfig) -> (ServerHandle, Arc<MetricsRecorder>) {
    let metrics = Arc::new(MetricsRecorder::new());
    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..config
    };
    let handle = start(config, Arc::clone(&metrics)).await.unwrap();
    (handle, metrics)
}

async fn connect(handle: &ServerHandle) -> WsStream {
    let url = format!("ws://127.0.0.1:{}/", handle.port());
    let (ws, _) = timeout(TIMEOUT, connect_async(url.as_str()))
        .await
        .expect("connect timed out")
        .unwrap();
    ws
}

async fn health(handle: &ServerHandle) -> Value {
    let url = format!("http://127.0.0.1:{}/health", handle.port());
    reqwest::get(&url).await.unwrap().json().await.unwrap()
}

/// Upgrades finish registering asynchronously, so poll until the hub agrees.
async fn wait_for_connections(handle: &ServerHandle, n: u64) {
    wait_for_connections_within(handle, n, TIMEOUT).await;
}

async fn wait_for_connections_within(handle: &ServerHandle, n: u64, limit: Duration) {
    timeout(limit, async {
        loop {
            if health(handle).await["connections"] == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("never reached {n} connections"));
}

async fn send(ws: &mut WsStream, text: &str) {
    ws.send(Message::Text(text.to_owned().into())).await.unwrap();
}

async fn recv_text(ws: &mut WsStream) -> String {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("receive timed out")
            .expect("stream ended")
            .unwrap();
        match msg {
            Message::Text(t) => return t.to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Assert nothing but control frames arrive within a short window.
async fn assert_silent(ws: &mut WsStream) {
    let deadline = tokio::time::Instant::now() + QUIET;
    loop {
        match tokio::time::timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
            Ok(other) => panic!("expected silence, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn hello_reaches_every_other_connection_once() {
    let (server, _metrics) = boot_server().await;
    let mut a = connect(&server).await;
    let mut b = connect(&server).await;
    let mut c = connect(&server).await;
    wait_for_connections(&server, 3).await;

    send(&mut a, "hello").await;

    assert_eq!(recv_text(&mut b).await, "hello");
    assert_eq!(recv_text(&mut c).await, "hello");
    assert_silent(&mut a).await;
    assert_silent(&mut b).await;
    assert_silent(&mut c).await;

    server.shutdown().await;
}

#[tokio::test]
async fn disconnect_between_messages() {
    let (server, _metrics) = boot_server().await;
    let mut a = connect(&server).await;
    let mut b = connect(&server).await;
    let mut c = connect(&server).await;
    wait_for_connections(&server, 3).await;

    send(&mut a, "m1").await;
    assert_eq!(recv_text(&mut b).await, "m1");
    assert_eq!(recv_text(&mut c).await, "m1");

    b.close(None).await.unwrap();
    wait_for_connections(&server, 2).await;

    send(&mut a, "m2").await;
    assert_eq!(recv_text(&mut c).await, "m2");
    assert_silent(&mut a).await;

    server.shutdown().await;
}

#[tokio::test]
async fn messages_from_one_sender_stay_in_order() {
    let (server, _metrics) = boot_server().await;
    let mut a = connect(&server).await;
    let mut b = connect(&server).await;
    wait_for_connections(&server, 2).await;

    let sent: Vec<String> = (0..100).map(|i| format!("line {i}")).collect();
    for text in &sent {
        send(&mut a, text).await;
    }

    let mut received = Vec::new();
    for _ in 0..sent.len() {
        received.push(recv_text(&mut b).await);
    }
    assert_eq!(received, sent);

    server.shutdown().await;
}

#[tokio::test]
async fn two_senders_each_keep_their_own_order() {
    let (server, _metrics) = boot_server().await;
    let mut a = connect(&server).await;
    let mut b = connect(&server).await;
    let mut c = connect(&server).await;
    wait_for_connections(&server, 3).await;

    for i in 0..20 {
        send(&mut a, &format!("a{i}")).await;
        send(&mut b, &format!("b{i}")).await;
    }

    let mut from_a = Vec::new();
    let mut from_b = Vec::new();
    for _ in 0..40 {
        let text = recv_text(&mut c).await;
        if text.starts_with('a') {
            from_a.push(text);
        } else {
            from_b.push(text);
        }
    }
    let expect = |p: &str| (0..20).map(|i| format!("{p}{i}")).collect::<Vec<_>>();
    assert_eq!(from_a, expect("a"));
    assert_eq!(from_b, expect("b"));

    server.shutdown().await;
}

#[tokio::test]
async fn lone_connection_gets_nothing_back() {
    let (server, _metrics) = boot_server().await;
    let mut a = connect(&server).await;
    wait_for_connections(&server, 1).await;

    send(&mut a, "anyone?").await;
    assert_silent(&mut a).await;

    server.shutdown().await;
}

#[tokio::test]
async fn dropped_socket_is_deregistered() {
    let (server, metrics) = boot_server().await;
    let a = connect(&server).await;
    let mut b = connect(&server).await;
    wait_for_connections(&server, 2).await;

    drop(a);
    wait_for_connections(&server, 1).await;

    send(&mut b, "still here").await;
    assert_silent(&mut b).await;
    assert_eq!(metrics.counter_get("relay.connections_closed", &[]), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn metrics_endpoint_reports_traffic() {
    let (server, _metrics) = boot_server().await;
    let mut a = connect(&server).await;
    let mut b = connect(&server).await;
    wait_for_connections(&server, 2).await;

    send(&mut a, "count me").await;
    assert_eq!(recv_text(&mut b).await, "count me");

    let url = format!("http://127.0.0.1:{}/metrics", server.port());
    let body: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    let value = |name: &str| {
        body["samples"]
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["name"] == name)
            .map(|s| s["value"].as_f64().unwrap())
    };
    assert_eq!(value("relay.connections"), Some(2.0));
    assert_eq!(value("relay.messages_received"), Some(1.0));
    assert_eq!(value("relay.messages_delivered"), Some(1.0));

    server.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_open_connections() {
    let (server, _metrics) = boot_server().await;
    let mut a = connect(&server).await;
    wait_for_connections(&server, 1).await;

    server.shutdown().await;

    let ended = timeout(TIMEOUT, async {
        loop {
            match a.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok());
}

#[tokio::test]
async fn binary_frames_are_relayed_unchanged() {
    let (server, _metrics) = boot_server().await;
    let mut a = connect(&server).await;
    let mut b = connect(&server).await;
    wait_for_connections(&server, 2).await;

    let body = vec![0xff, 0x00, 0x01, 0xfe];
    a.send(Message::Binary(body.clone().into())).await.unwrap();
    send(&mut a, "after").await;

    let frame = loop {
        match timeout(TIMEOUT, b.next()).await.unwrap().unwrap().unwrap() {
            Message::Ping(_) | Message::Pong(_) => continue,
            other => break other,
        }
    };
    match frame {
        Message::Binary(bytes) => assert_eq!(bytes[..], body[..]),
        other => panic!("expected binary frame, got {other:?}"),
    }
    assert_eq!(recv_text(&mut b).await, "after");

    server.shutdown().await;
}

#[tokio::test]
async fn unresponsive_peer_is_evicted() {
    let (server, metrics) = boot_with(ServerConfig {
        heartbeat_interval_secs: 1,
        ..Default::default()
    })
    .await;

    // never polled, so its pongs are never sent
    let _silent = connect(&server).await;
    let mut live = connect(&server).await;
    wait_for_connections(&server, 2).await;

    let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = live.next().await {
            if let Message::Text(text) = msg {
                let _ = seen_tx.send(text.to_string());
            }
        }
    });

    wait_for_connections_within(&server, 1, Duration::from_secs(10)).await;
    assert_eq!(metrics.counter_get("relay.connections_closed", &[]), 1);

    // the responsive peer outlives several more heartbeats
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(health(&server).await["connections"], 1);
    assert!(seen_rx.try_recv().is_err());

    server.shutdown().await;
    reader.abort();
}
