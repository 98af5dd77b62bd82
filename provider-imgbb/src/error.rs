//! Error types for the ImgBB provider

use bridge_traits::error::BridgeError;
use bridge_traits::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImgBbError {
    #[error("ImgBB API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// HTTP 200 with `"success": false`
    #[error("ImgBB rejected the upload: {0}")]
    Rejected(String),

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, ImgBbError>;

impl ImgBbError {
    pub fn into_store_error(self, limit: u64, actual: u64) -> StoreError {
        match self {
            ImgBbError::ApiError {
                status_code,
                message,
            } => StoreError::from_status(status_code, message, limit, actual),
            ImgBbError::Rejected(msg) => StoreError::PermanentProvider(msg),
            ImgBbError::ParseError(msg) => {
                StoreError::PermanentProvider(format!("unexpected imgbb response: {}", msg))
            }
            ImgBbError::BridgeError(e) if e.is_transient() => {
                StoreError::TransientNetwork(e.to_string())
            }
            ImgBbError::BridgeError(e) => StoreError::PermanentProvider(e.to_string()),
        }
    }
}
