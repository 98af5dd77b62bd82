use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Media error: {0}")]
    Media(#[from] core_media::MediaError),

    #[error("Content error: {0}")]
    Content(#[from] core_content::ContentError),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn capability(capability: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::CapabilityMissing {
            capability: capability.into(),
            message: message.into(),
        }
    }
}
