use bridge_traits::error::BridgeError;
use bridge_traits::{BackendKind, StoreError};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Upload failed: {0}")]
    UploadExhausted(UploadFailure),

    #[error("No storage backend is configured")]
    NoBackends,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Media not found: {0}")]
    NotFound(String),
}

impl MediaError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        MediaError::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;

/// One backend's failure inside an exhausted upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendAttempt {
    pub backend: BackendKind,
    pub reason: String,
    #[serde(skip)]
    pub error: StoreError,
}

impl BackendAttempt {
    pub fn new(backend: BackendKind, error: StoreError) -> Self {
        Self {
            backend,
            reason: error.to_string(),
            error,
        }
    }
}

/// Every backend in the chain failed; attempts are listed in chain order.
///
/// Serializes as `{"backendsTried": [{"backend": "...", "reason": "..."}]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFailure {
    pub backends_tried: Vec<BackendAttempt>,
}

impl UploadFailure {
    pub fn push(&mut self, backend: BackendKind, error: StoreError) {
        self.backends_tried.push(BackendAttempt::new(backend, error));
    }

    pub fn backends(&self) -> Vec<BackendKind> {
        self.backends_tried.iter().map(|a| a.backend).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends_tried.is_empty()
    }
}

impl fmt::Display for UploadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.backends_tried.is_empty() {
            return f.write_str("no backend accepted the file");
        }
        let parts: Vec<String> = self
            .backends_tried
            .iter()
            .map(|a| format!("{}: {}", a.backend, a.reason))
            .collect();
        write!(f, "tried {}", parts.join("; "))
    }
}
