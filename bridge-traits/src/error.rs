use thiserror::Error;

/// Failure of a host capability (HTTP, file system, settings).
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// The request never produced a response: refused, reset, DNS.
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether trying the same operation again could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BridgeError::Transport(_) | BridgeError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_failures_are_transient() {
        assert!(BridgeError::Timeout(60_000).is_transient());
        assert!(BridgeError::Transport("connection reset".into()).is_transient());
        assert!(!BridgeError::OperationFailed("encode form body".into()).is_transient());
        assert!(!BridgeError::NotAvailable("http".into()).is_transient());
    }
}
