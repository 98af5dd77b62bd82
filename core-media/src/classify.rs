//! Media kind detection from URLs and file names.
//!
//! Matching is a case-insensitive substring search for a dotted extension
//! anywhere in the input, image extensions first. Run it on normalized URLs:
//! share-link query strings can hide or fake an extension.

use bridge_traits::MediaKind;

pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp", ".svg"];

pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".mp4", ".avi", ".mov", ".wmv", ".flv", ".webm", ".mkv", ".m4v",
];

/// Kind implied by the URL, or `None` when no known extension appears.
pub fn detect(url: &str) -> Option<MediaKind> {
    let lower = url.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.iter().any(|ext| lower.contains(ext)) {
        return Some(MediaKind::Image);
    }
    if VIDEO_EXTENSIONS.iter().any(|ext| lower.contains(ext)) {
        return Some(MediaKind::Video);
    }
    None
}

/// Total classification: anything unrecognised is an image.
pub fn classify(url: &str) -> MediaKind {
    detect(url).unwrap_or(MediaKind::Image)
}

/// Lower-cased extension of a file name, without the dot.
pub fn extension_of(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.contains('/') {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
