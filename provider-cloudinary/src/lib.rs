//! # Cloudinary Provider
//!
//! Implements [`bridge_traits::StorageBackend`] for the Cloudinary upload API.
//!
//! Uploads go to `/{cloud}/{image|video}/upload` as a base64 data URI under
//! the `images` or `videos` folder. With an API secret the request is signed
//! (SHA-256); otherwise an unsigned upload preset is used.

pub mod connector;
pub mod error;
pub mod signing;
pub mod types;

pub use connector::{CloudinaryConnector, CLOUDINARY_MAX_BYTES};
pub use error::{CloudinaryError, Result};
