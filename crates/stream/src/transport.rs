//! Managed duplex connection to the live detection stream.
//!
//! [`StreamTransport`] owns one background task per `connect()` call.
//! The task connects, pumps messages until the socket drops, then
//! reconnects with exponential backoff until the retry budget runs out.
//! Parsed detection frames go to the [`FrameSink`] registered at
//! construction; keep-alives and malformed payloads never reach it.
//!
//! Every call to [`connect`](StreamTransport::connect) or
//! [`disconnect`](StreamTransport::disconnect) bumps an epoch. A task
//! whose epoch is no longer current cannot publish state or accept
//! outbound messages, so a superseded socket can never deliver into the
//! live session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use vigil_core::types::DetectionFrame;

use crate::client::{StreamClient, WsStream};
use crate::messages::{parse_message, StreamMessage};
use crate::reconnect::{Backoff, ConnectionState, ReconnectConfig};

/// How long `disconnect` waits for the connection task to finish.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest raw payload echoed into a parse-failure log line.
const MAX_LOGGED_PAYLOAD: usize = 256;

/// Consumer of inbound detection frames.
///
/// Called on the connection task for every frame, in delivery order.
/// Implementations must not block.
pub trait FrameSink: Send + Sync + 'static {
    fn on_frame(&self, frame: DetectionFrame);
}

impl<F> FrameSink for F
where
    F: Fn(DetectionFrame) + Send + Sync + 'static,
{
    fn on_frame(&self, frame: DetectionFrame) {
        self(frame)
    }
}

/// Persistent, self-healing connection to one stream endpoint.
pub struct StreamTransport {
    client: StreamClient,
    config: ReconnectConfig,
    sink: Arc<dyn FrameSink>,
    shared: Arc<Shared>,
}

struct Shared {
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ConnectionState>,
}

struct Inner {
    epoch: u64,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    session: Option<Session>,
}

/// Handle to the task serving one `connect()` call.
struct Session {
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish `state` if `epoch` is still the live one.
    fn publish(&self, epoch: u64, state: ConnectionState) -> bool {
        let inner = self.lock();
        if inner.epoch != epoch {
            return false;
        }
        self.state_tx.send_replace(state);
        true
    }

    /// Install the outbound channel of a freshly opened socket.
    fn open(&self, epoch: u64, outbound: mpsc::UnboundedSender<Message>) -> bool {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return false;
        }
        inner.outbound = Some(outbound);
        self.state_tx.send_replace(ConnectionState::Open);
        true
    }

    fn clear_outbound(&self, epoch: u64) {
        let mut inner = self.lock();
        if inner.epoch == epoch {
            inner.outbound = None;
        }
    }
}

impl StreamTransport {
    /// Create an idle transport for `client`'s endpoint.
    ///
    /// `sink` is registered once for the transport's whole lifetime.
    pub fn new(client: StreamClient, config: ReconnectConfig, sink: impl FrameSink) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            client,
            config,
            sink: Arc::new(sink),
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    epoch: 0,
                    outbound: None,
                    session: None,
                }),
                state_tx,
            }),
        }
    }

    pub fn url(&self) -> &str {
        self.client.ws_url()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state_tx.borrow().clone()
    }

    /// Change-notified view of the connection state.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Establish (or re-establish) the connection.
    ///
    /// Any previous connection task is cancelled first, and a pending
    /// reconnect timer dies with it. Must be called from within a Tokio
    /// runtime.
    pub fn connect(&self) {
        let cancel = CancellationToken::new();
        let mut inner = self.shared.lock();

        if let Some(old) = inner.session.take() {
            tracing::debug!(url = %self.client.ws_url(), "Tearing down previous stream connection");
            old.cancel.cancel();
        }
        inner.epoch += 1;
        inner.outbound = None;
        self.shared.state_tx.send_replace(ConnectionState::Connecting);

        let ctx = SessionContext {
            epoch: inner.epoch,
            client: self.client.clone(),
            config: self.config.clone(),
            sink: Arc::clone(&self.sink),
            shared: Arc::clone(&self.shared),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(async move {
            run_connection_loop(&ctx).await;
            tracing::debug!(epoch = ctx.epoch, "Stream connection task exited");
        });
        inner.session = Some(Session { cancel, task });
    }

    /// Send a JSON-encoded message if the socket is open.
    ///
    /// Returns `false` when the message was dropped. Outbound messages
    /// are never queued for a later connection.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode outbound stream message");
                return false;
            }
        };

        let inner = self.shared.lock();
        match &inner.outbound {
            Some(tx) => tx.send(Message::Text(text)).is_ok(),
            None => {
                tracing::trace!("Stream not open, dropping outbound message");
                false
            }
        }
    }

    /// Close the connection intentionally. No reconnect follows.
    ///
    /// Safe to call repeatedly and before any `connect()`.
    pub async fn disconnect(&self) {
        let session = {
            let mut inner = self.shared.lock();
            inner.epoch += 1;
            inner.outbound = None;
            self.shared.state_tx.send_replace(ConnectionState::Closed);
            inner.session.take()
        };

        if let Some(session) = session {
            tracing::info!(url = %self.client.ws_url(), "Disconnecting from detection stream");
            session.cancel.cancel();
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, session.task).await.is_err() {
                tracing::warn!("Stream connection task did not exit in time");
            }
        }
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        inner.epoch += 1;
        inner.outbound = None;
        if let Some(session) = inner.session.take() {
            session.cancel.cancel();
        }
    }
}

/// Everything a connection task needs, tagged with its epoch.
struct SessionContext {
    epoch: u64,
    client: StreamClient,
    config: ReconnectConfig,
    sink: Arc<dyn FrameSink>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

/// How a single socket session ended.
enum SessionEnd {
    /// Intentional shutdown; the close frame has been sent.
    Cancelled,
    /// The socket dropped for any other reason.
    Dropped,
}

/// Core connection loop: connect -> process -> back off -> reconnect.
///
/// Runs until cancelled or the retry budget is exhausted.
async fn run_connection_loop(ctx: &SessionContext) {
    let mut backoff = Backoff::new(ctx.config.clone());

    loop {
        if !ctx.shared.publish(ctx.epoch, ConnectionState::Connecting) {
            return;
        }

        let connected = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return,
            result = ctx.client.connect() => result,
        };

        match connected {
            Ok(conn) => {
                backoff.on_open();
                let (out_tx, out_rx) = mpsc::unbounded_channel();
                if !ctx.shared.open(ctx.epoch, out_tx) {
                    return;
                }

                let end = process_messages(conn.ws_stream, out_rx, ctx).await;
                ctx.shared.clear_outbound(ctx.epoch);
                if let SessionEnd::Cancelled = end {
                    return;
                }
                tracing::warn!(url = %ctx.client.ws_url(), "Detection stream connection lost");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Detection stream connection failed");
            }
        }

        if ctx.cancel.is_cancelled() {
            return;
        }

        match backoff.on_failure() {
            Some(delay) => {
                let attempt = backoff.attempt();
                if attempt <= 3 {
                    tracing::info!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnecting to detection stream",
                    );
                }
                let state = ConnectionState::Reconnecting { attempt, delay };
                if !ctx.shared.publish(ctx.epoch, state) {
                    return;
                }
                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => {
                let attempts = backoff.attempt();
                tracing::error!(
                    url = %ctx.client.ws_url(),
                    attempts,
                    "Max reconnection attempts reached, giving up",
                );
                ctx.shared.publish(ctx.epoch, ConnectionState::Failed { attempts });
                return;
            }
        }
    }
}

/// Pump one socket until it closes, errors, or the session is cancelled.
async fn process_messages(
    ws_stream: WsStream,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    ctx: &SessionContext,
) -> SessionEnd {
    let (mut sink, mut stream) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client disconnect".into(),
                };
                if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                    tracing::debug!(error = %e, "Close frame not delivered");
                }
                return SessionEnd::Cancelled;
            }
            Some(msg) = outbound.recv() => {
                if let Err(e) = sink.send(msg).await {
                    tracing::warn!(error = %e, "Failed to send stream message");
                    return SessionEnd::Dropped;
                }
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => handle_text_message(&text, ctx),
                Some(Ok(Message::Binary(_))) => {
                    tracing::trace!("Ignoring binary stream message");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // Handled automatically by tungstenite.
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Detection stream closed by backend");
                    return SessionEnd::Dropped;
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => {
                    // Informational only; the loop ending drives reconnection.
                    tracing::warn!(error = %e, "Detection stream receive error");
                    return SessionEnd::Dropped;
                }
                None => {
                    tracing::info!("Detection stream exhausted");
                    return SessionEnd::Dropped;
                }
            }
        }
    }
}

/// Decode one text frame and forward detection frames to the sink.
fn handle_text_message(text: &str, ctx: &SessionContext) {
    match parse_message(text) {
        Ok(StreamMessage::Frame(frame)) => {
            if !ctx.cancel.is_cancelled() {
                ctx.sink.on_frame(frame);
            }
        }
        Ok(StreamMessage::Ping) => {
            tracing::trace!("Stream keep-alive");
        }
        Ok(StreamMessage::Control(kind)) => {
            tracing::trace!(kind = %kind, "Ignoring stream control message");
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                raw_message = %truncate(text, MAX_LOGGED_PAYLOAD),
                "Failed to parse stream message",
            );
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
