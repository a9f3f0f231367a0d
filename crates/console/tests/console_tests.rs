//! End-to-end console behaviour: a local WebSocket server streams
//! frames, an in-memory backend stands in for the registry and session
//! control.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use common::{model, selection, Call, FakeBackend};
use vigil_console::{Console, ConsoleError, ConsoleOptions, DetectionStatus};
use vigil_core::error::CoreError;
use vigil_core::geometry::Size;
use vigil_core::selection::OperatorSelection;
use vigil_core::types::{DetectionBox, DetectionFrame, ModelUpdate};
use vigil_stream::client::StreamClient;
use vigil_stream::reconnect::{ConnectionState, ReconnectConfig};

const WAIT: Duration = Duration::from_secs(5);

async fn stream_frames(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(serve_frames)
}

/// Alternate pings and frames holding one `person` and one `car` box
/// from `m1`, every 20 ms, until the client goes away.
async fn serve_frames(mut socket: WebSocket) {
    let mut frame_idx = 0u64;
    loop {
        frame_idx += 1;
        let frame = serde_json::json!({
            "ts": 1_700_000_000.0,
            "frame_idx": frame_idx,
            "fps": 15.0,
            "width": 1280,
            "height": 720,
            "boxes": [
                {"id": 1, "cls": "person", "conf": 0.91, "xyxy": [10, 10, 100, 200], "model": "m1"},
                {"id": 2, "cls": "car", "conf": 0.55, "xyxy": [300, 300, 500, 400], "model": "m1"},
                {"id": 0, "cls": "person", "conf": 0.40, "xyxy": [0, 0, 5, 5]}
            ]
        });
        let ping = Message::Text(r#"{"type":"ping"}"#.into());
        if socket.send(ping).await.is_err() {
            return;
        }
        if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn spawn_stream() -> SocketAddr {
    let app = Router::new().route("/ws/live", get(stream_frames));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn console(addr: SocketAddr, backend: Arc<FakeBackend>, initial: OperatorSelection) -> Console {
    Console::new(
        backend,
        StreamClient::new(format!("ws://{addr}/ws/live")),
        ConsoleOptions {
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
                multiplier: 2.0,
                max_attempts: 5,
            },
            settle_delay: Duration::from_millis(30),
            display_size: Size::new(800.0, 450.0),
            initial_selection: initial,
        },
    )
}

fn backend() -> Arc<FakeBackend> {
    Arc::new(FakeBackend::with_models(vec![
        model("m1", &["person", "car"]),
        model("m2", &["fire"]),
    ]))
}

fn person_frame(frame_idx: u64) -> DetectionFrame {
    DetectionFrame {
        ts: 0.0,
        frame_idx,
        boxes: vec![DetectionBox {
            id: 3,
            cls: "person".into(),
            conf: 0.8,
            xyxy: [0.0, 0.0, 10.0, 10.0],
            model: Some("m1".into()),
            zone: None,
            event: None,
        }],
        fps: 10.0,
        width: None,
        height: None,
    }
}

async fn wait_for_frame(
    console: &Console,
    pred: impl FnMut(&Option<DetectionFrame>) -> bool,
) -> Option<DetectionFrame> {
    let mut frames = console.view().watch_frames();
    let frame = tokio::time::timeout(WAIT, frames.wait_for(pred))
        .await
        .expect("timed out waiting for frame")
        .expect("frame channel closed")
        .clone();
    frame
}

async fn wait_for_status(console: &Console, pred: impl FnMut(&DetectionStatus) -> bool) {
    let mut status = console.reconciler().watch_status();
    tokio::time::timeout(WAIT, status.wait_for(pred))
        .await
        .expect("timed out waiting for status")
        .expect("status channel closed");
}

#[tokio::test]
async fn frames_are_filtered_by_live_selection() {
    let addr = spawn_stream().await;
    let backend = backend();
    let console = console(addr, backend.clone(), selection(&[("m1", &["person"])]));
    console.start().await;

    let frame = wait_for_frame(&console, |f| f.is_some()).await.unwrap();
    assert_eq!(frame.boxes.len(), 1);
    assert_eq!(frame.boxes[0].cls, "person");
    assert_eq!(frame.boxes[0].model.as_deref(), Some("m1"));
    wait_for_status(&console, |s| s.is_detecting()).await;
    assert_eq!(console.view().fps(), 15.0);

    // Edit after the stream handler was registered.
    assert!(console.toggle_class("m1", "car", true).unwrap());
    wait_for_frame(&console, |f| f.as_ref().is_some_and(|f| f.boxes.len() == 2)).await;

    console.shutdown().await;
}

#[tokio::test]
async fn unselected_class_renders_nothing() {
    let addr = spawn_stream().await;
    let console = console(addr, backend(), selection(&[("m1", &["truck"])]));
    console.start().await;

    let frame = wait_for_frame(&console, |f| f.is_some()).await.unwrap();
    assert!(frame.boxes.is_empty());

    console.shutdown().await;
}

#[tokio::test]
async fn disabling_only_model_stops_session_and_clears_overlay() {
    let addr = spawn_stream().await;
    let backend = backend();
    let console = console(addr, backend.clone(), selection(&[("m1", &["person"])]));
    console.start().await;
    wait_for_status(&console, |s| s.is_detecting()).await;
    wait_for_frame(&console, |f| f.as_ref().is_some_and(|f| !f.boxes.is_empty())).await;

    console.set_model_enabled("m1", false).await.unwrap();
    // Blank on return; a frame ingested since then has nothing eligible.
    assert!(console.view().latest().map_or(true, |f| f.boxes.is_empty()));
    assert!(console.selection().current().selected_models().is_empty());
    assert!(console.selection().current().classes_for("m1").is_none());

    wait_for_status(&console, |s| *s == DetectionStatus::Stopped).await;
    assert!(backend.calls().contains(&Call::Update("m1".into(), ModelUpdate::enabled(false))));
    assert_eq!(backend.calls().last(), Some(&Call::Stop));
    assert!(!console.catalog().get("m1").await.unwrap().enabled);

    // Frames keep arriving but nothing is eligible any more.
    let frame = wait_for_frame(&console, |f| f.is_some()).await.unwrap();
    assert!(frame.boxes.is_empty());

    console.shutdown().await;
}

#[tokio::test]
async fn enabling_model_selects_it_without_starting() {
    let addr = spawn_stream().await;
    let backend = backend();
    let console = console(addr, backend.clone(), OperatorSelection::new());
    console.start().await;
    wait_for_status(&console, |s| *s == DetectionStatus::Stopped).await;

    console.set_model_enabled("m2", true).await.unwrap();
    assert!(console.selection().current().is_model_selected("m2"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(backend.count(|c| *c == Call::Start), 0);

    console.set_model_classes("m2", ["fire"]).unwrap();
    wait_for_status(&console, |s| s.is_detecting()).await;

    console.shutdown().await;
}

#[tokio::test]
async fn widening_class_edit_blanks_frame_on_screen() {
    let addr = spawn_stream().await;
    let console = console(addr, backend(), selection(&[("m1", &["person"])]));

    console.view().ingest(person_frame(1));
    assert_eq!(console.view().latest().unwrap().boxes.len(), 1);

    assert!(console.toggle_class("m1", "car", true).unwrap());
    assert!(console.view().latest().is_none());

    console.view().ingest(person_frame(2));
    assert!(console.set_model_classes("m1", ["car"]).unwrap());
    assert!(console.view().latest().is_none());
}

#[tokio::test]
async fn class_edit_for_unselected_model_is_rejected() {
    let addr = spawn_stream().await;
    let console = console(addr, backend(), OperatorSelection::new());

    assert_matches!(
        console.set_model_classes("m1", ["person"]),
        Err(ConsoleError::Selection(CoreError::ModelNotSelected(ref m))) if m == "m1"
    );
    assert_matches!(
        console.toggle_class("m1", "person", true),
        Err(ConsoleError::Selection(CoreError::ModelNotSelected(_)))
    );
    assert!(console.selection().current().selected_models().is_empty());
}

#[tokio::test]
async fn confidence_edit_is_validated_and_pushed() {
    let addr = spawn_stream().await;
    let backend = backend();
    let console = console(addr, backend.clone(), OperatorSelection::new());
    console.refresh_models().await.unwrap();

    assert_matches!(
        console.set_model_confidence("m1", 1.5).await,
        Err(ConsoleError::Selection(CoreError::Validation(_)))
    );
    console.set_model_confidence("m1", 0.6).await.unwrap();

    assert!(backend.calls().contains(&Call::Update("m1".into(), ModelUpdate::confidence(0.6))));
    assert_eq!(console.catalog().get("m1").await.unwrap().conf, 0.6);
}

#[tokio::test]
async fn shutdown_closes_stream_for_good() {
    let addr = spawn_stream().await;
    let console = console(addr, backend(), selection(&[("m1", &["person"])]));
    console.start().await;
    wait_for_frame(&console, |f| f.is_some()).await;

    console.shutdown().await;
    assert_eq!(console.transport().state(), ConnectionState::Closed);
    assert!(console.view().latest().is_none());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(console.transport().state(), ConnectionState::Closed);
    assert!(console.view().latest().is_none());

    // Idempotent.
    console.shutdown().await;
}
