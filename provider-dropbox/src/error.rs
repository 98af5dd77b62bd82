//! Error types for the Dropbox provider

use bridge_traits::error::BridgeError;
use bridge_traits::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DropboxError {
    /// Token missing, expired or lacking the `files.content.write` scope
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Dropbox API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// The link already exists but listing it returned nothing
    #[error("No shared link available for {path}")]
    SharedLinkMissing { path: String },

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, DropboxError>;

impl DropboxError {
    /// Classify for the fallback chain. `limit`/`actual` feed the size variant
    /// when the API answers 413.
    pub fn into_store_error(self, limit: u64, actual: u64) -> StoreError {
        match self {
            DropboxError::AuthenticationFailed(msg) => {
                StoreError::PermanentProvider(format!("dropbox authentication failed: {}", msg))
            }
            DropboxError::ApiError {
                status_code,
                message,
            } => StoreError::from_status(status_code, message, limit, actual),
            DropboxError::SharedLinkMissing { path } => {
                StoreError::PermanentProvider(format!("no shared link for {}", path))
            }
            DropboxError::ParseError(msg) => {
                StoreError::PermanentProvider(format!("unexpected dropbox response: {}", msg))
            }
            DropboxError::BridgeError(e) if e.is_transient() => {
                StoreError::TransientNetwork(e.to_string())
            }
            DropboxError::BridgeError(e) => StoreError::PermanentProvider(e.to_string()),
        }
    }
}
