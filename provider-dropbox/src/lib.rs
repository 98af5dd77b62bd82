//! # Dropbox Provider
//!
//! Implements [`bridge_traits::StorageBackend`] on top of the Dropbox v2 API.
//!
//! ## Overview
//!
//! An upload is two calls:
//! - `files/upload` writes the bytes under `/images` or `/videos`
//! - `sharing/create_shared_link_with_settings` publishes them
//!
//! When the file already has a shared link the existing one is looked up
//! with `sharing/list_shared_links`. The returned URL is the share-page link;
//! the upload orchestrator rewrites it into a direct link.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{DropboxConnector, DROPBOX_MAX_BYTES};
pub use error::{DropboxError, Result};
