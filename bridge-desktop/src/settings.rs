//! SQLite key-value store behind [`SettingsStore`].
//!
//! The content cache keeps one row per resource here. Rows carry a kind tag
//! (`text` or `int`) so the refresh timestamp can't be read back as a JSON
//! payload.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SettingsStore,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, warn};

const KIND_TEXT: &str = "text";
const KIND_INT: &str = "int";

fn db_error(context: &str) -> impl FnOnce(sqlx::Error) -> BridgeError + '_ {
    move |e| BridgeError::DatabaseError(format!("{}: {}", context, e))
}

/// Durable settings backed by a `kv_settings` table.
#[derive(Clone)]
pub struct SqliteSettingsStore {
    pool: SqlitePool,
}

impl SqliteSettingsStore {
    /// Open (or create) the store at `db_path`.
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(db_error("invalid settings path"))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(db_error("open settings database"))?;

        Self::ensure_table(&pool).await?;
        debug!(path = %db_path.display(), "Opened settings store");
        Ok(Self { pool })
    }

    /// A throwaway store on a single pinned `:memory:` connection.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(db_error("open in-memory settings"))?;

        Self::ensure_table(&pool).await?;
        Ok(Self { pool })
    }

    async fn ensure_table(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                kind TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(db_error("create kv_settings"))?;
        Ok(())
    }

    fn now_secs() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default()
    }

    const UPSERT: &'static str = r#"
        INSERT INTO kv_settings (key, value, kind, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            kind = excluded.kind,
            updated_at = excluded.updated_at
    "#;

    async fn put(&self, key: &str, value: &str, kind: &str) -> Result<()> {
        sqlx::query(Self::UPSERT)
            .bind(key)
            .bind(value)
            .bind(kind)
            .bind(Self::now_secs())
            .execute(&self.pool)
            .await
            .map_err(db_error("write setting"))?;
        Ok(())
    }

    async fn fetch(&self, key: &str, kind: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value, kind FROM kv_settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("read setting"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let stored_kind: String = row.get(1);
        if stored_kind != kind {
            warn!(key, expected = kind, stored = %stored_kind, "Setting kind mismatch");
            return Err(BridgeError::OperationFailed(format!(
                "setting {} holds {} data, not {}",
                key, stored_kind, kind
            )));
        }
        Ok(Some(row.get(0)))
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.put(key, value, KIND_TEXT).await
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.fetch(key, KIND_TEXT).await
    }

    async fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.put(key, &value.to_string(), KIND_INT).await
    }

    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        self.fetch(key, KIND_INT)
            .await?
            .map(|raw| {
                raw.parse().map_err(|e| {
                    BridgeError::OperationFailed(format!("setting {} is not an integer: {}", key, e))
                })
            })
            .transpose()
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(db_error("delete setting"))?;
        Ok(())
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM kv_settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("probe setting"))?;
        Ok(row.is_some())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM kv_settings ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list settings"))?;
        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    async fn set_strings(&self, entries: &[(String, String)]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin batch"))?;
        let now = Self::now_secs();
        for (key, value) in entries {
            sqlx::query(Self::UPSERT)
                .bind(key)
                .bind(value)
                .bind(KIND_TEXT)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(db_error("write batch"))?;
        }
        tx.commit().await.map_err(db_error("commit batch"))?;
        debug!(entries = entries.len(), "Stored settings batch");
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        // substr avoids LIKE treating '_' in resource prefixes as a wildcard
        let result = sqlx::query("DELETE FROM kv_settings WHERE substr(key, 1, ?) = ?")
            .bind(prefix.chars().count() as i64)
            .bind(prefix)
            .execute(&self.pool)
            .await
            .map_err(db_error("delete settings by prefix"))?;
        Ok(result.rows_affected() as usize)
    }
}
