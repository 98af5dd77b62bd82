//! Media metadata store.
//!
//! Access counters are bumped with a single `UPDATE ... SET access_count =
//! access_count + 1`, so concurrent touches never lose increments regardless
//! of how many pool connections run them.

use crate::error::{MediaError, Result};
use crate::links::normalize;
use crate::models::{MediaId, MediaQuery, MediaRecord};
use async_trait::async_trait;
use bridge_traits::Clock;
use sqlx::{query, query_as, SqlitePool};
use std::sync::Arc;
use tracing::instrument;

#[async_trait]
pub trait MediaRepository: Send + Sync {
    /// Persist a new record and return its id.
    async fn insert(&self, record: &MediaRecord) -> Result<MediaId>;

    async fn find_by_id(&self, id: &MediaId) -> Result<Option<MediaRecord>>;

    async fn find_by_url(&self, url: &str) -> Result<Option<MediaRecord>>;

    /// Increment the access count and stamp the access time.
    ///
    /// Returns `false` when no record has this id.
    async fn touch(&self, id: &MediaId) -> Result<bool>;

    /// [`MediaRepository::touch`] keyed by direct URL.
    async fn touch_by_url(&self, url: &str) -> Result<bool>;

    async fn query(&self, query: MediaQuery) -> Result<Vec<MediaRecord>>;

    async fn count(&self) -> Result<u64>;
}

pub struct SqliteMediaRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteMediaRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl MediaRepository for SqliteMediaRepository {
    #[instrument(skip(self, record), fields(id = %record.id, backend = %record.backend))]
    async fn insert(&self, record: &MediaRecord) -> Result<MediaId> {
        record
            .validate()
            .map_err(|e| MediaError::invalid("MediaRecord", e))?;

        query(
            r#"
            INSERT INTO media_records (
                id, direct_url, kind, backend, size_bytes, original_name,
                format, provider_id, link_verified, access_count,
                last_accessed_at, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.as_str())
        .bind(&record.direct_url)
        .bind(record.kind.as_str())
        .bind(record.backend.as_str())
        .bind(record.size_bytes as i64)
        .bind(&record.original_name)
        .bind(&record.format)
        .bind(&record.provider_id)
        .bind(record.link_verified)
        .bind(record.access_count as i64)
        .bind(record.last_accessed_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(record.id.clone())
    }

    async fn find_by_id(&self, id: &MediaId) -> Result<Option<MediaRecord>> {
        let record = query_as::<_, MediaRecord>("SELECT * FROM media_records WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<MediaRecord>> {
        let record = query_as::<_, MediaRecord>(
            "SELECT * FROM media_records WHERE direct_url = ? OR direct_url = ? LIMIT 1",
        )
        .bind(url)
        .bind(normalize(url))
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    #[instrument(skip(self))]
    async fn touch(&self, id: &MediaId) -> Result<bool> {
        let result = query(
            r#"
            UPDATE media_records
            SET access_count = access_count + 1, last_accessed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(self.clock.unix_timestamp_millis())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn touch_by_url(&self, url: &str) -> Result<bool> {
        let result = query(
            r#"
            UPDATE media_records
            SET access_count = access_count + 1, last_accessed_at = ?
            WHERE id = (
                SELECT id FROM media_records
                WHERE direct_url = ? OR direct_url = ?
                LIMIT 1
            )
            "#,
        )
        .bind(self.clock.unix_timestamp_millis())
        .bind(url)
        .bind(normalize(url))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, query: MediaQuery) -> Result<Vec<MediaRecord>> {
        let sql = match query.kind {
            Some(_) => format!(
                "SELECT * FROM media_records WHERE kind = ? ORDER BY {} LIMIT ?",
                query.order.sql()
            ),
            None => format!(
                "SELECT * FROM media_records ORDER BY {} LIMIT ?",
                query.order.sql()
            ),
        };

        let mut statement = query_as::<_, MediaRecord>(&sql);
        if let Some(kind) = query.kind {
            statement = statement.bind(kind.as_str());
        }
        let records = statement
            .bind(i64::from(query.limit))
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM media_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::{create_pool, create_test_pool, DatabaseConfig};
    use crate::models::MediaOrder;
    use bridge_traits::{BackendKind, MediaKind, SystemClock};
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock that advances one millisecond per reading.
    pub(crate) struct StepClock(AtomicI64);

    impl StepClock {
        pub(crate) fn starting_at(millis: i64) -> Self {
            Self(AtomicI64::new(millis))
        }
    }

    impl Clock for StepClock {
        fn now(&self) -> DateTime<Utc> {
            let millis = self.0.fetch_add(1, Ordering::SeqCst);
            Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
        }
    }

    pub(crate) fn record(kind: MediaKind, url: &str, created_at: i64) -> MediaRecord {
        MediaRecord {
            id: MediaId::new(),
            direct_url: url.to_string(),
            kind,
            backend: BackendKind::LocalFilesystem,
            size_bytes: 1024,
            original_name: "lemon.jpg".to_string(),
            format: "jpg".to_string(),
            provider_id: None,
            link_verified: None,
            access_count: 0,
            last_accessed_at: None,
            created_at,
        }
    }

    async fn repo() -> SqliteMediaRepository {
        let pool = create_test_pool().await.unwrap();
        SqliteMediaRepository::new(pool, Arc::new(StepClock::starting_at(1_700_000_000_000)))
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = repo().await;
        let rec = record(MediaKind::Video, "/uploads/videos/a.mp4?raw=1", 10);

        let id = repo.insert(&rec).await.unwrap();
        let found = repo.find_by_id(&id).await.unwrap().unwrap();

        assert_eq!(found, rec);
        assert!(repo.find_by_id(&MediaId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid_record() {
        let repo = repo().await;
        let mut rec = record(MediaKind::Image, "", 10);
        rec.direct_url.clear();

        let err = repo.insert(&rec).await.unwrap_err();
        assert!(matches!(err, MediaError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_insert_rejects_share_link() {
        let repo = repo().await;
        let rec = record(MediaKind::Image, "https://www.dropbox.com/s/abc/x.jpg?dl=0", 10);

        let err = repo.insert(&rec).await.unwrap_err();
        assert!(matches!(err, MediaError::InvalidInput { .. }));
        assert_eq!(repo.count().await.unwrap(), 0);

        let fixed = record(MediaKind::Image, &crate::links::normalize(&rec.direct_url), 10);
        repo.insert(&fixed).await.unwrap();
    }

    #[tokio::test]
    async fn test_touch_updates_counters() {
        let repo = repo().await;
        let rec = record(MediaKind::Image, "/uploads/images/a.jpg?raw=1", 10);
        repo.insert(&rec).await.unwrap();

        assert!(repo.touch(&rec.id).await.unwrap());
        assert!(repo.touch_by_url("/uploads/images/a.jpg").await.unwrap());
        assert!(!repo.touch(&MediaId::from("missing")).await.unwrap());

        let found = repo.find_by_id(&rec.id).await.unwrap().unwrap();
        assert_eq!(found.access_count, 2);
        assert!(found.last_accessed_at.unwrap() >= 1_700_000_000_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_touches_do_not_lose_updates() {
        let dir = std::env::temp_dir().join(format!("core-media-touch-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let pool = create_pool(DatabaseConfig::new(dir.join("media.db")).max_connections(5))
            .await
            .unwrap();
        let repo = Arc::new(SqliteMediaRepository::new(pool.clone(), Arc::new(SystemClock)));

        let rec = record(MediaKind::Image, "https://cdn.example.com/a.jpg?raw=1", 10);
        repo.insert(&rec).await.unwrap();

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let repo = Arc::clone(&repo);
                let id = rec.id.clone();
                tokio::spawn(async move { repo.touch(&id).await.unwrap() })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let found = repo.find_by_id(&rec.id).await.unwrap().unwrap();
        assert_eq!(found.access_count, 50);

        pool.close().await;
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_query_filters_and_orders() {
        let repo = repo().await;
        let old_image = record(MediaKind::Image, "/uploads/images/old.jpg?raw=1", 100);
        let new_image = record(MediaKind::Image, "/uploads/images/new.jpg?raw=1", 300);
        let video = record(MediaKind::Video, "/uploads/videos/v.mp4?raw=1", 200);
        for rec in [&old_image, &new_image, &video] {
            repo.insert(rec).await.unwrap();
        }
        repo.touch(&old_image.id).await.unwrap();

        let newest = repo.query(MediaQuery::new()).await.unwrap();
        let ids: Vec<&MediaId> = newest.iter().map(|r| &r.id).collect();
        assert_eq!(ids, vec![&new_image.id, &video.id, &old_image.id]);

        let images = repo
            .query(MediaQuery::new().kind(MediaKind::Image).limit(1))
            .await
            .unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].id, new_image.id);

        let popular = repo
            .query(MediaQuery::new().order(MediaOrder::MostAccessed))
            .await
            .unwrap();
        assert_eq!(popular[0].id, old_image.id);

        assert_eq!(repo.count().await.unwrap(), 3);
    }
}
