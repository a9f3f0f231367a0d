//! Live stream message types and parser.
//!
//! The backend sends JSON text frames of two shapes: control messages
//! carrying a `"type"` discriminator (e.g. `{"type":"ping","ts":...}`)
//! and untagged detection frames. This module turns them into a
//! strongly-typed [`StreamMessage`].

use serde::Deserialize;
use vigil_core::types::DetectionFrame;

/// Control message type the backend sends as a keep-alive.
pub const MSG_TYPE_PING: &str = "ping";

/// All inbound live-stream messages.
#[derive(Debug, Clone)]
pub enum StreamMessage {
    /// Keep-alive from the backend. Never forwarded to consumers.
    Ping,

    /// A control message of a type this console does not act on.
    Control(String),

    /// A batch of detections for one frame.
    Frame(DetectionFrame),
}

/// Errors raised while decoding a single inbound message.
///
/// These never terminate the connection; the caller logs and drops the
/// message.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The payload is not valid JSON.
    #[error("Invalid JSON: {0}")]
    Json(#[source] serde_json::Error),

    /// The payload is JSON but not a JSON object.
    #[error("Expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// The payload has no `type` and does not match the frame shape.
    #[error("Malformed detection frame: {0}")]
    Frame(#[source] serde_json::Error),
}

/// Only the discriminator is inspected before deciding how to decode.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Parse a live-stream text message.
pub fn parse_message(text: &str) -> Result<StreamMessage, MessageError> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(MessageError::Json)?;
    if !value.is_object() {
        return Err(MessageError::NotAnObject(json_kind(&value)));
    }

    let envelope = Envelope::deserialize(&value).map_err(MessageError::Frame)?;
    match envelope.kind {
        Some(kind) if kind == MSG_TYPE_PING => Ok(StreamMessage::Ping),
        Some(kind) => Ok(StreamMessage::Control(kind)),
        None => DetectionFrame::deserialize(value)
            .map(StreamMessage::Frame)
            .map_err(MessageError::Frame),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
