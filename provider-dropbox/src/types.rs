//! Dropbox API request and response types
//!
//! See: https://www.dropbox.com/developers/documentation/http/documentation

use serde::{Deserialize, Serialize};

/// `Dropbox-API-Arg` header payload for `files/upload`
#[derive(Debug, Clone, Serialize)]
pub struct UploadArg {
    pub path: String,
    pub mode: WriteMode,
    pub autorename: bool,
    pub mute: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    Add,
    Overwrite,
}

/// Subset of `FileMetadata` returned by `files/upload`
#[derive(Debug, Clone, Deserialize)]
pub struct FileMetadata {
    pub id: String,
    pub name: String,
    pub path_display: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SharedLinkSettings {
    pub requested_visibility: &'static str,
    pub audience: &'static str,
    pub access: &'static str,
}

impl SharedLinkSettings {
    pub fn public_viewer() -> Self {
        Self {
            requested_visibility: "public",
            audience: "public",
            access: "viewer",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSharedLinkArg {
    pub path: String,
    pub settings: SharedLinkSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListSharedLinksArg {
    pub path: String,
    pub direct_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SharedLinkMetadata {
    pub url: String,
    #[serde(default)]
    pub path_lower: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListSharedLinksResult {
    pub links: Vec<SharedLinkMetadata>,
}

/// Error envelope of the RPC endpoints (409 responses)
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error_summary: String,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl ApiErrorBody {
    /// The `.tag` of the top-level error union.
    pub fn tag(&self) -> Option<&str> {
        self.error.as_ref()?.get(".tag")?.as_str()
    }
}
