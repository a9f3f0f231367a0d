//! Backend collaborator seam: model registry and detection session
//! control.
//!
//! The console only depends on this trait; the HTTP implementation lives
//! in `vigil-stream`, and tests substitute an in-memory fake.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::BackendError;
use crate::types::{ModelConfig, ModelUpdate};

/// Acknowledgement returned by session start/stop calls.
///
/// The backend's payload shape varies between start and stop, so only
/// the commonly present fields are typed; the rest is kept raw.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SessionAck {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[async_trait]
pub trait DetectionBackend: Send + Sync {
    /// List every model known to the registry.
    async fn list_models(&self) -> Result<Vec<ModelConfig>, BackendError>;

    /// Apply a partial update to one model.
    async fn update_model(&self, name: &str, update: &ModelUpdate) -> Result<(), BackendError>;

    /// Start the detection session. Idempotent on the backend side.
    async fn start_detection(&self) -> Result<SessionAck, BackendError>;

    /// Stop the detection session. Idempotent on the backend side.
    async fn stop_detection(&self) -> Result<SessionAck, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_keeps_unknown_fields() {
        let ack: SessionAck =
            serde_json::from_str(r#"{"status":"started","models":["m1"]}"#).unwrap();
        assert_eq!(ack.status.as_deref(), Some("started"));
        assert!(ack.message.is_none());
        assert!(ack.extra.contains_key("models"));
    }
}
