//! # ImgBB Provider
//!
//! Image-only [`bridge_traits::StorageBackend`] backed by the ImgBB
//! `1/upload` endpoint. The direct image URL from the response is what gets
//! recorded; the display and delete URLs are logged for operators.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{ImgBbConnector, IMGBB_MAX_BYTES};
pub use error::{ImgBbError, Result};
