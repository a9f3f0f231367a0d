//! Live detection stream and backend REST client library.
//!
//! Provides typed stream message parsing, WebSocket connection
//! management with exponential-backoff reconnection, and HTTP wrappers
//! for the model registry and detection session control.

pub mod api;
pub mod client;
pub mod messages;
pub mod reconnect;
pub mod transport;
