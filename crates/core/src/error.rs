#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Model not selected: {0}")]
    ModelNotSelected(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Failure reported by a backend collaborator (model registry or
/// detection session control).
///
/// `reason` is always human-readable; for session start failures it is
/// the text shown to the operator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Backend rejected request ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    #[error("Unexpected backend response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    /// Human-readable reason, without the variant prefix.
    pub fn reason(&self) -> &str {
        match self {
            BackendError::Unreachable(r) => r,
            BackendError::Rejected { reason, .. } => reason,
            BackendError::InvalidResponse(r) => r,
        }
    }
}
