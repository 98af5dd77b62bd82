//! Error types for the Cloudinary provider

use bridge_traits::error::BridgeError;
use bridge_traits::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudinaryError {
    /// Neither an API secret nor an upload preset is configured
    #[error("Cloudinary credentials incomplete: {0}")]
    Credentials(String),

    #[error("Cloudinary API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, CloudinaryError>;

impl CloudinaryError {
    pub fn into_store_error(self, limit: u64, actual: u64) -> StoreError {
        match self {
            CloudinaryError::Credentials(msg) => StoreError::PermanentProvider(msg),
            CloudinaryError::ApiError {
                status_code,
                message,
            } => StoreError::from_status(status_code, message, limit, actual),
            CloudinaryError::ParseError(msg) => {
                StoreError::PermanentProvider(format!("unexpected cloudinary response: {}", msg))
            }
            CloudinaryError::BridgeError(e) if e.is_transient() => {
                StoreError::TransientNetwork(e.to_string())
            }
            CloudinaryError::BridgeError(e) => StoreError::PermanentProvider(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let invalid = CloudinaryError::ApiError {
            status_code: 400,
            message: "Invalid image file".into(),
        };
        assert!(invalid.into_store_error(10, 1).is_permanent());

        let limited = CloudinaryError::ApiError {
            status_code: 429,
            message: "rate limited".into(),
        };
        assert!(limited.into_store_error(10, 1).is_retryable());

        assert!(CloudinaryError::Credentials("no secret".into())
            .into_store_error(10, 1)
            .is_permanent());
    }
}
