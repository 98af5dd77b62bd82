//! Database blob backend.
//!
//! Keeps the bytes in the `media_blobs` table of the media database and
//! serves them back from `/api/media/{id}`.

use crate::classify::extension_of;
use crate::processing::content_type_for;
use crate::tracker::{AccessEvent, AccessTracker};
use async_trait::async_trait;
use bridge_traits::{
    BackendKind, Clock, MediaKind, StorageBackend, StoreError, StoreRequest, StoreResult,
    StoredObject,
};
use bytes::Bytes;
use sqlx::{query, query_as, SqlitePool};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

pub const DATABASE_BLOB_MAX_BYTES: u64 = 150 * 1024 * 1024;

/// Route prefix the host serves blobs from.
pub const BLOB_ROUTE: &str = "/api/media";

const ACCEPTED: &[MediaKind] = &[MediaKind::Image, MediaKind::Video];

/// A blob read back for serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobContent {
    pub bytes: Bytes,
    pub content_type: String,
    pub kind: MediaKind,
    pub file_name: String,
}

pub struct DatabaseBlobBackend {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    tracker: Option<AccessTracker>,
}

impl DatabaseBlobBackend {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            clock,
            tracker: None,
        }
    }

    /// Count reads against the matching media record.
    pub fn with_tracker(mut self, tracker: AccessTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn blob_url(id: &str) -> String {
        format!("{}/{}", BLOB_ROUTE, id)
    }

    /// Load a blob for serving. `None` when the id is unknown.
    #[instrument(skip(self))]
    pub async fn read(&self, id: &str) -> crate::error::Result<Option<BlobContent>> {
        let row: Option<(String, String, Vec<u8>)> =
            query_as("SELECT file_name, kind, data FROM media_blobs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let Some((file_name, kind, data)) = row else {
            return Ok(None);
        };
        let kind: MediaKind = kind
            .parse()
            .map_err(|e: String| crate::error::MediaError::invalid("kind", e))?;
        let extension = extension_of(&file_name).unwrap_or_default();

        if let Some(tracker) = &self.tracker {
            tracker.track(AccessEvent::new(Self::blob_url(id), Some(kind)));
        }

        Ok(Some(BlobContent {
            bytes: Bytes::from(data),
            content_type: content_type_for(kind, &extension).to_string(),
            kind,
            file_name,
        }))
    }
}

fn store_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            StoreError::TransientNetwork(format!("database unavailable: {}", e))
        }
        other => StoreError::PermanentProvider(format!("database write failed: {}", other)),
    }
}

#[async_trait]
impl StorageBackend for DatabaseBlobBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::DatabaseBlob
    }

    fn max_bytes(&self) -> u64 {
        DATABASE_BLOB_MAX_BYTES
    }

    fn accepted_kinds(&self) -> &'static [MediaKind] {
        ACCEPTED
    }

    #[instrument(skip(self, request), fields(file_name = %request.file_name, size = request.size()))]
    async fn store(&self, request: StoreRequest) -> StoreResult<StoredObject> {
        let id = Uuid::new_v4().to_string();
        let size = request.size() as i64;

        query(
            r#"
            INSERT INTO media_blobs (id, file_name, kind, content_type, size_bytes, data, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&request.file_name)
        .bind(request.kind.as_str())
        .bind(&request.content_type)
        .bind(size)
        .bind(request.bytes.as_ref())
        .bind(self.clock.unix_timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        debug!(blob_id = %id, "Stored blob in database");
        Ok(StoredObject::new(Self::blob_url(&id)).with_provider_id(id))
    }
}
