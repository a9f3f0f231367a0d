//! WebSocket client for the live detection stream.
//!
//! [`StreamClient`] holds the endpoint configuration.  Call
//! [`StreamClient::connect`] to open a live [`StreamConnection`].

use tokio_tungstenite::{connect_async, MaybeTlsStream};

/// The raw WebSocket stream type used by this crate.
pub type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for the live stream endpoint.
#[derive(Debug, Clone)]
pub struct StreamClient {
    ws_url: String,
}

/// A live WebSocket connection to the stream endpoint.
pub struct StreamConnection {
    /// The URL this connection was opened against.
    pub ws_url: String,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: WsStream,
}

impl StreamClient {
    /// Create a client for a fixed endpoint, e.g. `ws://host:8000/ws/live`.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
        }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Open the WebSocket connection.
    pub async fn connect(&self) -> Result<StreamConnection, StreamClientError> {
        let (ws_stream, _response) = connect_async(self.ws_url.as_str()).await.map_err(|e| {
            StreamClientError::Connection(format!(
                "Failed to connect to detection stream at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(url = %self.ws_url, "Connected to detection stream");

        Ok(StreamConnection {
            ws_url: self.ws_url.clone(),
            ws_stream,
        })
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum StreamClientError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),
}
