//! Storage backends that live inside this process.
//!
//! Remote providers live in their own crates and implement the same
//! [`bridge_traits::StorageBackend`] contract.

pub mod database_blob;
pub mod local;

pub use database_blob::{BlobContent, DatabaseBlobBackend, BLOB_ROUTE, DATABASE_BLOB_MAX_BYTES};
pub use local::{LocalFilesystemBackend, LOCAL_MAX_BYTES};
