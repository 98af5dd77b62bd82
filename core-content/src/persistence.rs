//! Durable snapshot surface.
//!
//! Each resource is stored as one JSON string under `<prefix>.<resource>`,
//! overwritten wholesale. The time of the last completed cycle lives under
//! `<prefix>.__refreshed_at`.

use bridge_traits::SettingsStore;
use core_runtime::events::CacheSnapshot;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;

const REFRESHED_AT_KEY: &str = "__refreshed_at";

pub struct SnapshotStore {
    settings: Arc<dyn SettingsStore>,
    prefix: String,
}

impl SnapshotStore {
    pub fn new(settings: Arc<dyn SettingsStore>, prefix: impl Into<String>) -> Self {
        Self {
            settings,
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, resource: &str) -> String {
        format!("{}.{}", self.prefix, resource)
    }

    pub async fn save(&self, resource: &str, value: &Value) -> Result<()> {
        self.settings
            .set_string(&self.key(resource), &value.to_string())
            .await?;
        Ok(())
    }

    /// Persist every entry of `snapshot` plus the cycle timestamp.
    pub async fn save_all(&self, snapshot: &CacheSnapshot, refreshed_at: i64) -> Result<()> {
        let entries: Vec<(String, String)> = snapshot
            .iter()
            .map(|(resource, value)| (self.key(resource), value.to_string()))
            .collect();
        self.settings.set_strings(&entries).await?;
        self.settings
            .set_i64(&self.key(REFRESHED_AT_KEY), refreshed_at)
            .await?;
        debug!(resources = snapshot.len(), "Persisted snapshot");
        Ok(())
    }

    /// The stored text of one resource, exactly as persisted.
    pub async fn load_raw(&self, resource: &str) -> Result<Option<String>> {
        Ok(self.settings.get_string(&self.key(resource)).await?)
    }

    /// Read back whatever was persisted for `resources`. Entries that no
    /// longer parse are skipped.
    pub async fn load<'a, I>(&self, resources: I) -> Result<CacheSnapshot>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut snapshot = CacheSnapshot::new();
        for resource in resources {
            let Some(raw) = self.load_raw(resource).await? else {
                continue;
            };
            match serde_json::from_str::<Value>(&raw) {
                Ok(value) => {
                    snapshot.insert(resource, value);
                }
                Err(e) => warn!(resource, error = %e, "Ignoring unreadable persisted resource"),
            }
        }
        Ok(snapshot)
    }

    pub async fn refreshed_at(&self) -> Result<Option<i64>> {
        Ok(self.settings.get_i64(&self.key(REFRESHED_AT_KEY)).await?)
    }

    /// Drop everything under this store's prefix, including resources that
    /// are no longer configured.
    pub async fn clear(&self) -> Result<usize> {
        let removed = self
            .settings
            .delete_prefix(&format!("{}.", self.prefix))
            .await?;
        debug!(removed, "Cleared persisted snapshot");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::SqliteSettingsStore;
    use serde_json::json;

    async fn store() -> SnapshotStore {
        let settings = SqliteSettingsStore::in_memory().await.unwrap();
        SnapshotStore::new(Arc::new(settings), "content_cache")
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = store().await;
        let mut snapshot = CacheSnapshot::new();
        snapshot.insert("products", json!([{"id": 1, "name": "Citrons"}]));
        snapshot.insert("settings", json!({"shopName": "Ferme"}));

        store.save_all(&snapshot, 1_700_000_000_000).await.unwrap();

        let loaded = store.load(["products", "settings", "farms"]).await.unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(store.refreshed_at().await.unwrap(), Some(1_700_000_000_000));
        assert_eq!(
            store.load_raw("settings").await.unwrap().as_deref(),
            Some(r#"{"shopName":"Ferme"}"#)
        );
    }

    #[tokio::test]
    async fn test_clear_removes_keys() {
        let store = store().await;
        store.save("farms", &json!([])).await.unwrap();
        store.save("retired", &json!({})).await.unwrap();
        assert_eq!(store.clear().await.unwrap(), 2);

        assert!(store.load_raw("farms").await.unwrap().is_none());
        assert!(store.refreshed_at().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreadable_entry_is_skipped() {
        let settings = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        settings
            .set_string("content_cache.products", "{not json")
            .await
            .unwrap();
        let store = SnapshotStore::new(settings, "content_cache");

        assert!(store.load(["products"]).await.unwrap().is_empty());
    }
}
