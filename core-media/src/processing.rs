//! Upload pre-processing: image re-encoding and stored-name generation.
//!
//! Runs once per upload, before any backend sees the bytes.

use crate::classify::extension_of;
use crate::error::{MediaError, Result};
use bridge_traits::{Clock, MediaKind};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::io::Cursor;
use tracing::{debug, warn};

const NAME_SUFFIX_LEN: usize = 6;

/// Bytes ready to be handed to a backend.
#[derive(Debug, Clone)]
pub struct PreparedMedia {
    pub bytes: Bytes,
    pub kind: MediaKind,
    /// Extension the stored file will carry, lower-case, no dot
    pub extension: String,
    pub content_type: String,
    /// Whether the image was decoded and re-encoded
    pub reencoded: bool,
}

/// Image constraints applied before storage.
#[derive(Debug, Clone, Copy)]
pub struct ImageLimits {
    pub max_edge: u32,
    pub jpeg_quality: u8,
}

/// Bound the longest edge and re-encode to JPEG.
///
/// Images that already fit are still re-encoded; they are never enlarged.
pub fn reencode_image(data: &[u8], limits: ImageLimits) -> Result<Vec<u8>> {
    let img = image::load_from_memory(data)
        .map_err(|e| MediaError::ImageProcessing(format!("Failed to decode image: {}", e)))?;

    let (width, height) = (img.width(), img.height());
    let img = if width.max(height) > limits.max_edge {
        img.resize(limits.max_edge, limits.max_edge, FilterType::Lanczos3)
    } else {
        img
    };

    let rgb = img.to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(Cursor::new(&mut buffer), limits.jpeg_quality)
        .encode_image(&rgb)
        .map_err(|e| MediaError::ImageProcessing(format!("Failed to encode image: {}", e)))?;

    debug!(
        original_width = width,
        original_height = height,
        width = rgb.width(),
        height = rgb.height(),
        bytes = buffer.len(),
        "Image re-encoded"
    );
    Ok(buffer)
}

/// Prepare bytes for storage.
///
/// Declared images that decode are re-encoded to JPEG. Anything else keeps its
/// original bytes, so a mislabelled video is stored untouched.
pub fn prepare(data: Bytes, declared: MediaKind, file_name: &str, limits: ImageLimits) -> PreparedMedia {
    let original_ext = extension_of(file_name);

    if declared == MediaKind::Image {
        match reencode_image(&data, limits) {
            Ok(encoded) => {
                return PreparedMedia {
                    bytes: Bytes::from(encoded),
                    kind: MediaKind::Image,
                    extension: "jpg".to_string(),
                    content_type: "image/jpeg".to_string(),
                    reencoded: true,
                };
            }
            Err(e) => {
                warn!(file_name, error = %e, "Keeping original bytes");
            }
        }
    }

    let extension = match (declared, original_ext) {
        (_, Some(ext)) => ext,
        (MediaKind::Video, None) => "mp4".to_string(),
        (MediaKind::Image, None) => "bin".to_string(),
    };
    let content_type = content_type_for(declared, &extension).to_string();

    PreparedMedia {
        bytes: data,
        kind: declared,
        extension,
        content_type,
        reencoded: false,
    }
}

/// Content type served for a stored file.
pub fn content_type_for(kind: MediaKind, extension: &str) -> &'static str {
    match (kind, extension) {
        (MediaKind::Video, "mov") => "video/quicktime",
        (MediaKind::Video, "avi") => "video/x-msvideo",
        (MediaKind::Video, "webm") => "video/webm",
        (MediaKind::Video, _) => "video/mp4",
        (MediaKind::Image, "png") => "image/png",
        (MediaKind::Image, "gif") => "image/gif",
        (MediaKind::Image, "webp") => "image/webp",
        (MediaKind::Image, "svg") => "image/svg+xml",
        (MediaKind::Image, "bmp") => "image/bmp",
        (MediaKind::Image, "jpg" | "jpeg") => "image/jpeg",
        (MediaKind::Image, _) => "application/octet-stream",
    }
}

/// `<unix-millis>-<6 random alphanumerics>.<ext>`
pub fn unique_name(clock: &dyn Clock, extension: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NAME_SUFFIX_LEN)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{}-{}.{}", clock.unix_timestamp_millis(), suffix, extension)
}
