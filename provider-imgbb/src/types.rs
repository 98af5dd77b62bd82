//! ImgBB API response types

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub data: Option<UploadedImage>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadedImage {
    pub id: String,
    /// Direct link to the image file
    pub url: String,
    pub display_url: String,
    #[serde(default)]
    pub delete_url: Option<String>,
    #[serde(default)]
    pub image: Option<ImageFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageFile {
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub mime: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(default)]
    pub code: Option<u32>,
}
