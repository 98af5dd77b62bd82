//! Storage Backend Contract
//!
//! One implementation per media storage provider. The upload orchestrator
//! walks an ordered chain of these and falls through on failure, so every
//! failure must be reported as a [`StoreError`] variant rather than a bare
//! message.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::media::MediaKind;

/// Closed set of storage providers the core knows how to dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Content-addressed file host with share links
    Dropbox,
    /// Blob column in the metadata database
    DatabaseBlob,
    /// Files under the server's public upload root
    LocalFilesystem,
    /// Image/video CDN
    Cloudinary,
    /// Generic image host (images only)
    #[serde(rename = "imgbb")]
    ImgBb,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Dropbox,
        BackendKind::DatabaseBlob,
        BackendKind::LocalFilesystem,
        BackendKind::Cloudinary,
        BackendKind::ImgBb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Dropbox => "dropbox",
            BackendKind::DatabaseBlob => "database_blob",
            BackendKind::LocalFilesystem => "local_filesystem",
            BackendKind::Cloudinary => "cloudinary",
            BackendKind::ImgBb => "imgbb",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        match wanted.as_str() {
            "database" | "mongodb" => return Ok(BackendKind::DatabaseBlob),
            "local" => return Ok(BackendKind::LocalFilesystem),
            _ => {}
        }
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| format!("unknown storage backend: {s}"))
    }
}

/// Bytes plus the metadata a backend needs to store them.
#[derive(Debug, Clone)]
pub struct StoreRequest {
    pub bytes: Bytes,
    pub kind: MediaKind,
    /// Final, unique file name (already carrying the right extension)
    pub file_name: String,
    pub content_type: String,
}

impl StoreRequest {
    pub fn new(
        bytes: Bytes,
        kind: MediaKind,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            bytes,
            kind,
            file_name: file_name.into(),
            content_type: content_type.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// What a backend hands back on success.
///
/// `url` is provider specific and not guaranteed to be a direct link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub url: String,
    /// Provider-side identifier (file id, public id, blob row id)
    pub provider_id: Option<String>,
    /// Format reported by the provider, when it re-encodes
    pub format: Option<String>,
}

impl StoredObject {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            provider_id: None,
            format: None,
        }
    }

    pub fn with_provider_id(mut self, id: impl Into<String>) -> Self {
        self.provider_id = Some(id.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("payload of {actual} bytes exceeds the {limit} byte limit")]
    SizeExceeded { limit: u64, actual: u64 },

    #[error("{kind} uploads are not accepted")]
    UnsupportedKind { kind: MediaKind },

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("provider rejected the upload: {0}")]
    PermanentProvider(String),
}

impl StoreError {
    /// Only transient network failures may be retried on the same backend.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::TransientNetwork(_))
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, StoreError::PermanentProvider(_))
    }

    /// Map an HTTP status from a provider API onto the taxonomy.
    pub fn from_status(status: u16, message: impl Into<String>, limit: u64, actual: u64) -> Self {
        let message = message.into();
        match status {
            413 => StoreError::SizeExceeded { limit, actual },
            408 | 429 | 500..=599 => {
                StoreError::TransientNetwork(format!("HTTP {status}: {message}"))
            }
            _ => StoreError::PermanentProvider(format!("HTTP {status}: {message}")),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A single storage provider.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Hard size ceiling in bytes
    fn max_bytes(&self) -> u64;

    fn accepted_kinds(&self) -> &'static [MediaKind];

    fn accepts(&self, kind: MediaKind) -> bool {
        self.accepted_kinds().contains(&kind)
    }

    /// Reject requests this backend can never take, without touching the network.
    fn check(&self, request: &StoreRequest) -> StoreResult<()> {
        if !self.accepts(request.kind) {
            return Err(StoreError::UnsupportedKind { kind: request.kind });
        }
        if request.size() > self.max_bytes() {
            return Err(StoreError::SizeExceeded {
                limit: self.max_bytes(),
                actual: request.size(),
            });
        }
        Ok(())
    }

    /// Store the bytes and return the provider's URL for them.
    async fn store(&self, request: StoreRequest) -> StoreResult<StoredObject>;
}
