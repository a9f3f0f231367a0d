//! Integration tests for the stream transport against a local WebSocket
//! backend.
//!
//! Each test runs an axum server that follows a per-connection script
//! and reports what it observes on an event channel.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::sync::mpsc;
use vigil_core::types::DetectionFrame;
use vigil_stream::client::StreamClient;
use vigil_stream::reconnect::{ConnectionState, ReconnectConfig};
use vigil_stream::transport::StreamTransport;

const WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Scripted backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Step {
    Send(String),
    Close,
}

#[derive(Debug, PartialEq)]
enum ServerEvent {
    Connected(usize),
    Received(usize, String),
    ClientClosed(usize, Option<u16>),
}

type Script = Arc<dyn Fn(usize) -> Vec<Step> + Send + Sync>;

#[derive(Clone)]
struct Backend {
    events: mpsc::UnboundedSender<ServerEvent>,
    connections: Arc<AtomicUsize>,
    script: Script,
}

async fn upgrade(ws: WebSocketUpgrade, State(backend): State<Backend>) -> Response {
    ws.on_upgrade(move |socket| run_script(socket, backend))
}

async fn run_script(mut socket: WebSocket, backend: Backend) {
    let n = backend.connections.fetch_add(1, Ordering::SeqCst) + 1;
    let _ = backend.events.send(ServerEvent::Connected(n));

    for step in (backend.script)(n) {
        match step {
            Step::Send(text) => {
                if socket.send(Message::Text(text.into())).await.is_err() {
                    return;
                }
            }
            Step::Close => {
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
        }
    }

    loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => {
                let _ = backend
                    .events
                    .send(ServerEvent::Received(n, text.as_str().to_string()));
            }
            Some(Ok(Message::Close(frame))) => {
                let _ = backend
                    .events
                    .send(ServerEvent::ClientClosed(n, frame.map(|f| f.code)));
                return;
            }
            Some(Ok(_)) => {}
            Some(Err(_)) | None => {
                let _ = backend.events.send(ServerEvent::ClientClosed(n, None));
                return;
            }
        }
    }
}

async fn spawn_backend(
    script: impl Fn(usize) -> Vec<Step> + Send + Sync + 'static,
) -> (SocketAddr, mpsc::UnboundedReceiver<ServerEvent>, Arc<AtomicUsize>) {
    let (events, events_rx) = mpsc::unbounded_channel();
    let connections = Arc::new(AtomicUsize::new(0));
    let backend = Backend {
        events,
        connections: Arc::clone(&connections),
        script: Arc::new(script),
    };
    let app = Router::new()
        .route("/ws/live", get(upgrade))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, events_rx, connections)
}

fn frame_json(frame_idx: u64) -> String {
    serde_json::json!({
        "ts": 1700000000.0,
        "frame_idx": frame_idx,
        "fps": 5.0,
        "width": 1280,
        "height": 720,
        "boxes": [{"id": 1, "cls": "person", "conf": 0.9, "xyxy": [0, 0, 10, 10], "model": "m1"}]
    })
    .to_string()
}

fn fast_config(max_attempts: u32) -> ReconnectConfig {
    ReconnectConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        multiplier: 2.0,
        max_attempts,
    }
}

fn collecting_transport(
    addr: SocketAddr,
    config: ReconnectConfig,
) -> (StreamTransport, mpsc::UnboundedReceiver<DetectionFrame>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let transport = StreamTransport::new(
        StreamClient::new(format!("ws://{addr}/ws/live")),
        config,
        move |frame: DetectionFrame| {
            let _ = tx.send(frame);
        },
    );
    (transport, rx)
}

async fn wait_for_state(transport: &StreamTransport, pred: impl FnMut(&ConnectionState) -> bool) {
    let mut rx = transport.watch_state();
    tokio::time::timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed");
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> ServerEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for server event")
        .expect("server event channel closed")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Keep-alives and malformed payloads are dropped; frames arrive in order
/// and the connection survives the bad payload.
#[tokio::test]
async fn frames_delivered_pings_and_garbage_dropped() {
    let (addr, _events, _) = spawn_backend(|_| {
        vec![
            Step::Send(r#"{"type":"ping","ts":1.0}"#.into()),
            Step::Send("{{ definitely not json".into()),
            Step::Send(frame_json(1)),
            Step::Send(r#"{"type":"ping","ts":2.0}"#.into()),
            Step::Send(frame_json(2)),
        ]
    })
    .await;
    let (transport, mut frames) = collecting_transport(addr, fast_config(5));
    transport.connect();

    let first = tokio::time::timeout(WAIT, frames.recv()).await.unwrap().unwrap();
    let second = tokio::time::timeout(WAIT, frames.recv()).await.unwrap().unwrap();
    assert_eq!(first.frame_idx, 1);
    assert_eq!(second.frame_idx, 2);
    assert_eq!(first.boxes[0].model.as_deref(), Some("m1"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(frames.try_recv().is_err());
    assert_eq!(transport.state(), ConnectionState::Open);

    transport.disconnect().await;
}

/// Outbound messages are JSON-encoded and reach the backend only while open.
#[tokio::test]
async fn send_reaches_backend_when_open() {
    let (addr, mut events, _) = spawn_backend(|_| vec![]).await;
    let (transport, _frames) = collecting_transport(addr, fast_config(5));

    assert!(!transport.send(&serde_json::json!({"type": "early"})));

    transport.connect();
    wait_for_state(&transport, |s| s.is_open()).await;
    assert_eq!(next_event(&mut events).await, ServerEvent::Connected(1));

    assert!(transport.send(&serde_json::json!({"type": "hello", "n": 1})));
    match next_event(&mut events).await {
        ServerEvent::Received(1, text) => {
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value, serde_json::json!({"type": "hello", "n": 1}));
        }
        other => panic!("Expected Received, got {other:?}"),
    }

    transport.disconnect().await;
}

/// A backend-initiated close is abnormal from the client's view and
/// triggers a reconnect.
#[tokio::test]
async fn reconnects_after_backend_close() {
    let (addr, _events, connections) = spawn_backend(|n| {
        if n == 1 {
            vec![Step::Close]
        } else {
            vec![Step::Send(frame_json(42))]
        }
    })
    .await;
    let (transport, mut frames) = collecting_transport(addr, fast_config(5));
    transport.connect();

    let frame = tokio::time::timeout(WAIT, frames.recv()).await.unwrap().unwrap();
    assert_eq!(frame.frame_idx, 42);
    assert_eq!(connections.load(Ordering::SeqCst), 2);
    wait_for_state(&transport, |s| s.is_open()).await;

    transport.disconnect().await;
}

/// After the retry budget is spent the transport reports a terminal
/// failure and stays quiet.
#[tokio::test]
async fn gives_up_after_max_attempts() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (transport, _frames) = collecting_transport(addr, fast_config(3));
    transport.connect();

    wait_for_state(&transport, |s| matches!(s, ConnectionState::Failed { .. })).await;
    assert_matches!(transport.state(), ConnectionState::Failed { attempts: 3 });

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_matches!(transport.state(), ConnectionState::Failed { attempts: 3 });
}

/// A fresh connect() after a terminal failure starts a new budget.
#[tokio::test]
async fn connect_after_failure_recovers() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (transport, _frames) = collecting_transport(addr, fast_config(1));
    transport.connect();
    wait_for_state(&transport, |s| matches!(s, ConnectionState::Failed { .. })).await;

    transport.connect();
    assert_ne!(transport.state(), ConnectionState::Failed { attempts: 1 });
    transport.disconnect().await;
    assert_eq!(transport.state(), ConnectionState::Closed);
}

/// Intentional disconnect closes with code 1000 and never reconnects.
#[tokio::test]
async fn disconnect_closes_normally_without_reconnect() {
    let (addr, mut events, connections) = spawn_backend(|_| vec![]).await;
    let (transport, _frames) = collecting_transport(addr, fast_config(5));
    transport.connect();
    wait_for_state(&transport, |s| s.is_open()).await;
    assert_eq!(next_event(&mut events).await, ServerEvent::Connected(1));

    transport.disconnect().await;
    assert_eq!(next_event(&mut events).await, ServerEvent::ClientClosed(1, Some(1000)));
    assert_eq!(transport.state(), ConnectionState::Closed);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(connections.load(Ordering::SeqCst), 1);
    assert_eq!(transport.state(), ConnectionState::Closed);

    transport.disconnect().await;
    assert_eq!(transport.state(), ConnectionState::Closed);
}

/// Reconnecting tears down the previous socket before the new one serves.
#[tokio::test]
async fn connect_supersedes_previous_socket() {
    let (addr, mut events, connections) = spawn_backend(|_| vec![]).await;
    let (transport, _frames) = collecting_transport(addr, fast_config(5));

    transport.connect();
    wait_for_state(&transport, |s| s.is_open()).await;
    assert_eq!(next_event(&mut events).await, ServerEvent::Connected(1));

    transport.connect();
    let mut saw_close = false;
    let mut saw_second = false;
    while !(saw_close && saw_second) {
        match next_event(&mut events).await {
            ServerEvent::ClientClosed(1, _) => saw_close = true,
            ServerEvent::Connected(2) => saw_second = true,
            other => panic!("Unexpected server event {other:?}"),
        }
    }
    wait_for_state(&transport, |s| s.is_open()).await;
    assert_eq!(connections.load(Ordering::SeqCst), 2);

    transport.disconnect().await;
}
