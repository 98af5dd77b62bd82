//! Storage Abstractions
//!
//! File I/O for the local media root and the durable key-value surface that
//! holds the persisted content snapshot.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Disk access for the local media root.
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn save_upload(fs: &dyn FileSystemAccess, root: &Path, data: Bytes) -> Result<()> {
///     let dir = root.join("images");
///     fs.create_dir_all(&dir).await?;
///     fs.write_file(&dir.join("photo.jpg"), data).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Per-host data directory, created on first use.
    async fn get_data_directory(&self) -> Result<PathBuf>;

    async fn exists(&self, path: &Path) -> Result<bool>;

    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Replace the file at `path`, creating parent directories. Readers see
    /// either the old content or the new one.
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    async fn delete_file(&self, path: &Path) -> Result<()>;
}

/// Durable key-value surface.
///
/// The desktop implementation is SQLite backed; a browser host would map it to
/// `localStorage`. Values written here must survive a process restart.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn remember(store: &dyn SettingsStore, payload: &str) -> Result<()> {
///     store.set_string("content_cache.products", payload).await
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    async fn set_i64(&self, key: &str, value: i64) -> Result<()>;

    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }

    /// All keys, sorted.
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Write several string values as one unit.
    ///
    /// Stores that can group writes (SQLite) override this so a reader never
    /// observes half of a content snapshot. The fallback writes in order.
    async fn set_strings(&self, entries: &[(String, String)]) -> Result<()> {
        for (key, value) in entries {
            self.set_string(key, value).await?;
        }
        Ok(())
    }

    /// Delete every key that starts with `prefix`, returning how many went.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let mut removed = 0;
        for key in self.list_keys().await? {
            if key.starts_with(prefix) {
                self.delete(&key).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
