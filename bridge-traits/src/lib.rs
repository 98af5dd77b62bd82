//! # Host Bridge Traits
//!
//! Capability contracts shared by the storefront core and the hosts that embed it.
//!
//! ## Overview
//!
//! The core never talks to the network, the disk or a storage provider
//! directly. Each of those capabilities is described here as a trait and
//! injected at construction time, so the same orchestration code runs against
//! the desktop adapters in `bridge-desktop`, against provider crates, or
//! against in-memory fakes in tests.
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Async HTTP with retry policy and per-request timeouts
//! - [`FileSystemAccess`](storage::FileSystemAccess) - File I/O for the local media root
//!
//! ### Storage
//! - [`SettingsStore`](storage::SettingsStore) - Durable key-value surface (content snapshot persistence)
//! - [`StorageBackend`](backend::StorageBackend) - One media storage provider
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! Host capabilities report [`BridgeError`](error::BridgeError). Storage
//! backends report the narrower [`StoreError`](backend::StoreError), whose
//! variants drive the upload fallback chain:
//!
//! | Variant | Retry same backend | Fall through |
//! |---------|--------------------|--------------|
//! | `SizeExceeded` | no | yes |
//! | `UnsupportedKind` | no | yes |
//! | `TransientNetwork` | yes | yes |
//! | `PermanentProvider` | no | yes (logged as unexpected) |
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared as
//! `Arc<dyn Trait>` across tokio tasks.
//!
//! ## Examples
//!
//! ### Implementing StorageBackend
//!
//! ```ignore
//! use async_trait::async_trait;
//! use bridge_traits::backend::{BackendKind, StorageBackend, StoreRequest, StoreResult, StoredObject};
//! use bridge_traits::media::MediaKind;
//!
//! struct NullBackend;
//!
//! #[async_trait]
//! impl StorageBackend for NullBackend {
//!     fn kind(&self) -> BackendKind { BackendKind::LocalFilesystem }
//!     fn max_bytes(&self) -> u64 { 1024 }
//!     fn accepted_kinds(&self) -> &'static [MediaKind] { &[MediaKind::Image] }
//!     async fn store(&self, request: StoreRequest) -> StoreResult<StoredObject> {
//!         Ok(StoredObject::new(format!("/null/{}", request.file_name)))
//!     }
//! }
//! ```

pub mod backend;
pub mod error;
pub mod http;
pub mod media;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use backend::{
    BackendKind, StorageBackend, StoreError, StoreRequest, StoreResult, StoredObject,
};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use media::MediaKind;
pub use storage::{FileSystemAccess, SettingsStore};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
