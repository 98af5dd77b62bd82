//! Media records and listing queries.

use bridge_traits::{BackendKind, MediaKind};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::fmt;
use uuid::Uuid;

/// Default number of records returned by a listing.
pub const DEFAULT_LIST_LIMIT: u32 = 50;

/// Unique identifier for a stored media item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(pub String);

impl MediaId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MediaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Canonical description of one stored asset.
///
/// Everything except the access counters is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    pub id: MediaId,
    /// Normalized, byte-fetchable URL
    pub direct_url: String,
    pub kind: MediaKind,
    pub backend: BackendKind,
    pub size_bytes: u64,
    pub original_name: String,
    /// Stored file extension (`jpg`, `mp4`, ...)
    pub format: String,
    pub provider_id: Option<String>,
    /// Result of the reachability probe, when one ran
    pub link_verified: Option<bool>,
    pub access_count: u64,
    /// Unix millis
    pub last_accessed_at: Option<i64>,
    /// Unix millis
    pub created_at: i64,
}

impl MediaRecord {
    pub fn validate(&self) -> Result<(), String> {
        if self.direct_url.trim().is_empty() {
            return Err("Media URL cannot be empty".to_string());
        }
        if !crate::links::is_direct(&self.direct_url) {
            return Err(format!("Media URL is not a direct link: {}", self.direct_url));
        }
        if self.original_name.trim().is_empty() {
            return Err("Original file name cannot be empty".to_string());
        }
        if self.format.is_empty() {
            return Err("Media format cannot be empty".to_string());
        }
        Ok(())
    }
}

impl<'r> FromRow<'r, SqliteRow> for MediaRecord {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        let kind: String = row.try_get("kind")?;
        let backend: String = row.try_get("backend")?;
        let size_bytes: i64 = row.try_get("size_bytes")?;
        let access_count: i64 = row.try_get("access_count")?;

        Ok(Self {
            id: MediaId(row.try_get("id")?),
            direct_url: row.try_get("direct_url")?,
            kind: kind.parse().map_err(|e: String| decode_error("kind", e))?,
            backend: backend
                .parse()
                .map_err(|e: String| decode_error("backend", e))?,
            size_bytes: size_bytes.max(0) as u64,
            original_name: row.try_get("original_name")?,
            format: row.try_get("format")?,
            provider_id: row.try_get("provider_id")?,
            link_verified: row.try_get("link_verified")?,
            access_count: access_count.max(0) as u64,
            last_accessed_at: row.try_get("last_accessed_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

fn decode_error(column: &str, message: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: message.into(),
    }
}

/// What the upload boundary hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub id: MediaId,
    pub url: String,
    pub backend: BackendKind,
    pub kind: MediaKind,
    pub size_bytes: u64,
}

impl From<&MediaRecord> for UploadReceipt {
    fn from(record: &MediaRecord) -> Self {
        Self {
            id: record.id.clone(),
            url: record.direct_url.clone(),
            backend: record.backend,
            kind: record.kind,
            size_bytes: record.size_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaOrder {
    #[default]
    NewestFirst,
    OldestFirst,
    MostAccessed,
}

impl MediaOrder {
    pub(crate) fn sql(&self) -> &'static str {
        match self {
            MediaOrder::NewestFirst => "created_at DESC, id DESC",
            MediaOrder::OldestFirst => "created_at ASC, id ASC",
            MediaOrder::MostAccessed => "access_count DESC, created_at DESC",
        }
    }
}

/// Listing filter for the media library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaQuery {
    pub kind: Option<MediaKind>,
    pub limit: u32,
    pub order: MediaOrder,
}

impl MediaQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: MediaKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn order(mut self, order: MediaOrder) -> Self {
        self.order = order;
        self
    }
}

impl Default for MediaQuery {
    fn default() -> Self {
        Self {
            kind: None,
            limit: DEFAULT_LIST_LIMIT,
            order: MediaOrder::NewestFirst,
        }
    }
}
