//! REST client for the backend model registry and session control.
//!
//! Wraps the backend HTTP API (model listing, partial model updates,
//! detection start/stop) using [`reqwest`], and exposes it to the
//! console through the [`DetectionBackend`] trait.

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use vigil_core::backend::{DetectionBackend, SessionAck};
use vigil_core::error::BackendError;
use vigil_core::types::{ModelConfig, ModelUpdate};

/// HTTP client for one backend instance.
#[derive(Debug, Clone)]
pub struct BackendApi {
    client: reqwest::Client,
    api_url: Url,
}

/// Errors from the backend REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Backend API error ({status}): {detail}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Human-readable reason extracted from the body.
        detail: String,
    },

    /// The configured base URL cannot carry path segments.
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),
}

impl From<ApiError> for BackendError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Request(e) if e.is_decode() => BackendError::InvalidResponse(e.to_string()),
            ApiError::Request(e) => BackendError::Unreachable(e.to_string()),
            ApiError::ApiError { status, detail } => BackendError::Rejected {
                status,
                reason: detail,
            },
            ApiError::InvalidUrl(url) => BackendError::Unreachable(format!("invalid URL {url}")),
        }
    }
}

/// FastAPI-style error body: `{"detail": "..."}` or `{"error": "..."}`.
#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
    error: Option<String>,
}

impl BackendApi {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8000`.
    pub fn new(api_url: &str) -> Result<Self, ApiError> {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: &str) -> Result<Self, ApiError> {
        let api_url = Url::parse(api_url).map_err(|e| ApiError::InvalidUrl(format!("{api_url}: {e}")))?;
        if api_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(api_url.to_string()));
        }
        Ok(Self { client, api_url })
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// Fetch every model in the registry (`GET /api/models`).
    pub async fn list_models(&self) -> Result<Vec<ModelConfig>, ApiError> {
        let response = self
            .client
            .get(self.endpoint(&["api", "models"])?)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Apply a partial update to a model (`PUT /api/models/{name}`).
    ///
    /// The model name is percent-encoded as a single path segment.
    pub async fn update_model(&self, name: &str, update: &ModelUpdate) -> Result<(), ApiError> {
        let response = self
            .client
            .put(self.endpoint(&["api", "models", name])?)
            .json(update)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Start the detection session (`POST /api/system/detection/start`).
    pub async fn start_detection(&self) -> Result<SessionAck, ApiError> {
        let response = self
            .client
            .post(self.endpoint(&["api", "system", "detection", "start"])?)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Stop the detection session (`POST /api/system/detection/stop`).
    pub async fn stop_detection(&self) -> Result<SessionAck, ApiError> {
        let response = self
            .client
            .post(self.endpoint(&["api", "system", "detection", "stop"])?)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.api_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Ensure the response has a success status code. On failure the
    /// body is mined for a human-readable `detail`.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::ApiError {
                status: status.as_u16(),
                detail: extract_detail(&body),
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

/// Pull the reason string out of an error body, falling back to the raw
/// text.
fn extract_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: Some(serde_json::Value::String(detail)),
            ..
        }) => detail,
        Ok(ErrorBody {
            detail: Some(detail),
            ..
        }) => detail.to_string(),
        Ok(ErrorBody {
            error: Some(error), ..
        }) => error,
        _ if body.trim().is_empty() => "no details provided".to_string(),
        _ => body.trim().to_string(),
    }
}

#[async_trait]
impl DetectionBackend for BackendApi {
    async fn list_models(&self) -> Result<Vec<ModelConfig>, BackendError> {
        Ok(BackendApi::list_models(self).await?)
    }

    async fn update_model(&self, name: &str, update: &ModelUpdate) -> Result<(), BackendError> {
        Ok(BackendApi::update_model(self, name, update).await?)
    }

    async fn start_detection(&self) -> Result<SessionAck, BackendError> {
        Ok(BackendApi::start_detection(self).await?)
    }

    async fn stop_detection(&self) -> Result<SessionAck, BackendError> {
        Ok(BackendApi::stop_detection(self).await?)
    }
}
