use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContentError {
    /// Endpoint unreachable, timed out or answered with a non-2xx status
    #[error("Failed to fetch '{resource}': {message}")]
    FetchFailed { resource: String, message: String },

    /// Endpoint answered but the payload is not the expected JSON
    #[error("Failed to decode '{resource}': {message}")]
    DecodeFailed { resource: String, message: String },

    #[error("Unknown content resource: {0}")]
    UnknownResource(String),

    #[error("Snapshot persistence failed: {0}")]
    Persistence(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, ContentError>;

impl ContentError {
    pub fn fetch(resource: impl Into<String>, message: impl Into<String>) -> Self {
        ContentError::FetchFailed {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn decode(resource: impl Into<String>, message: impl Into<String>) -> Self {
        ContentError::DecodeFailed {
            resource: resource.into(),
            message: message.into(),
        }
    }
}
