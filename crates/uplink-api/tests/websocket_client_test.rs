#![allow(clippy::unwrap_used)]
// Integration tests for the WebSocket upstream client against a local server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderMap;

use uplink_api::{
    ClientConfig, PingConfig, QueueConfig, SessionState, UpstreamClient, UpstreamConnector,
    WebSocketConnector,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn client_config(
    addr: std::net::SocketAddr,
    ping: PingConfig,
    misses: Arc<AtomicUsize>,
) -> ClientConfig {
    ClientConfig {
        device_name: "mac:aabbccddeeff".into(),
        firmware_name: "fw-2.1".into(),
        model_name: "X1".into(),
        manufacturer: "Acme".into(),
        destination_url: format!("http://{addr}/api/v2/device"),
        outbound_queue: QueueConfig::default(),
        encoder_queue: QueueConfig::default(),
        decoder_queue: QueueConfig::default(),
        handler_registry_queue: QueueConfig::default(),
        handle_msg_queue: QueueConfig::default(),
        tls: None,
        token: SecretString::from("secret-token".to_string()),
        handle_ping_miss: Arc::new(move || {
            misses.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
        ping,
        max_backoff: Duration::from_secs(1),
    }
}

// ── Session tests ───────────────────────────────────────────────────

#[tokio::test]
async fn test_session_presents_identity_and_moves_frames() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (headers_tx, headers_rx) = oneshot::channel::<HeaderMap>();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let capture = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let _ = headers_tx.send(req.headers().clone());
            Ok(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, capture).await.unwrap();

        ws.send(Message::Binary(Bytes::from_static(b"hello"))).await.unwrap();

        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Binary(data) = msg {
                return data;
            }
        }
        Bytes::new()
    });

    let client = WebSocketConnector
        .connect(client_config(addr, PingConfig::default(), Arc::default()))
        .await
        .unwrap();

    let headers = tokio::time::timeout(Duration::from_secs(5), headers_rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(headers["authorization"], "Bearer secret-token");
    assert_eq!(headers["x-webpa-device-name"], "mac:aabbccddeeff");
    assert_eq!(headers["x-webpa-model-name"], "X1");
    assert_eq!(headers["x-webpa-manufacturer"], "Acme");
    assert_eq!(headers["x-webpa-firmware-name"], "fw-2.1");

    let mut inbound = client.take_inbound().await.unwrap();
    assert!(client.take_inbound().await.is_none());

    let frame = tokio::time::timeout(Duration::from_secs(5), inbound.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&frame[..], b"hello");

    client.send(Bytes::from_static(b"world")).await.unwrap();
    let echoed = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&echoed[..], b"world");

    client.close().await.unwrap();
    client.close().await.unwrap();
    assert_eq!(client.state(), SessionState::Closed);
    assert!(client.send(Bytes::from_static(b"late")).await.is_err());
}

#[tokio::test]
async fn test_missed_pings_invoke_handler() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        // Never ping; just hold the connection open.
        while ws.next().await.is_some() {}
    });

    let misses = Arc::new(AtomicUsize::new(0));
    let ping = PingConfig {
        ping_wait: Duration::from_millis(50),
        max_ping_miss: 2,
    };
    let client = WebSocketConnector
        .connect(client_config(addr, ping, Arc::clone(&misses)))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while misses.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(client.state(), SessionState::Connected);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_unbounded_ping_wait_keeps_session_alive() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Binary(Bytes::from_static(b"up"))).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let ping = PingConfig {
        ping_wait: Duration::from_secs(u64::MAX),
        max_ping_miss: 3,
    };
    let client = WebSocketConnector
        .connect(client_config(addr, ping, Arc::default()))
        .await
        .unwrap();

    let mut inbound = client.take_inbound().await.unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(5), inbound.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&frame[..], b"up");
    assert_eq!(client.state(), SessionState::Connected);

    client.close().await.unwrap();
    assert_eq!(client.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_close_while_reconnecting() {
    // Nothing listens on this port once the listener is dropped.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let client = WebSocketConnector
        .connect(client_config(addr, PingConfig::default(), Arc::default()))
        .await
        .unwrap();

    let mut state = client.watch_state();
    let reconnecting = state.wait_for(|s| matches!(s, SessionState::Reconnecting { .. }));
    tokio::time::timeout(Duration::from_secs(5), reconnecting)
        .await
        .unwrap()
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), client.close())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(client.state(), SessionState::Closed);
}
