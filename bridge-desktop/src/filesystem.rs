//! Tokio-backed file access for the local media root.
//!
//! Uploaded files are written through a sibling `.part` file and renamed
//! into place, so a reader serving `/uploads/...` never sees a half-written
//! image.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::FileSystemAccess,
};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const APP_DIR: &str = "storefront-core";
const PARTIAL_SUFFIX: &str = "part";

/// [`FileSystemAccess`] over `tokio::fs`.
#[derive(Debug, Clone)]
pub struct TokioFileSystem {
    data_dir: PathBuf,
}

impl TokioFileSystem {
    /// Roots the accessor at `<platform data dir>/storefront-core`.
    pub fn new() -> Self {
        let base = dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            data_dir: base.join(APP_DIR),
        }
    }

    pub fn with_data_directory(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn partial_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".");
        name.push(PARTIAL_SUFFIX);
        path.with_file_name(name)
    }
}

impl Default for TokioFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn get_data_directory(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.data_dir).await?;
        Ok(self.data_dir.clone())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await?)
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path).await?;
        Ok(Bytes::from(data))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        if path.file_name().is_none() {
            return Err(BridgeError::OperationFailed(format!(
                "not a file path: {}",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let partial = Self::partial_path(path);
        if let Err(e) = fs::write(&partial, data.as_ref()).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&partial, path).await {
            warn!(path = %path.display(), error = %e, "Failed to move partial upload into place");
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }

        debug!(path = %path.display(), bytes = data.len(), "Stored file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("storefront-fs-{}-{}", name, std::process::id()))
    }

    #[tokio::test]
    async fn data_directory_is_created_on_demand() {
        let data = scratch_dir("data");
        let fs = TokioFileSystem::with_data_directory(&data);

        assert_eq!(fs.get_data_directory().await.unwrap(), data);
        assert!(fs.exists(&data).await.unwrap());

        tokio::fs::remove_dir_all(&data).await.unwrap();
    }

    #[tokio::test]
    async fn upload_write_leaves_no_partial_file() {
        let root = scratch_dir("write");
        let fs = TokioFileSystem::with_data_directory(&root);
        let file = root.join("uploads").join("images").join("a.jpg");

        let data = Bytes::from_static(b"\xFF\xD8\xFF");
        fs.write_file(&file, data.clone()).await.unwrap();

        assert_eq!(fs.read_file(&file).await.unwrap(), data);
        assert!(!fs.exists(&root.join("uploads/images/a.jpg.part")).await.unwrap());

        fs.delete_file(&file).await.unwrap();
        assert!(!fs.exists(&file).await.unwrap());

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[test]
    fn partial_path_sits_next_to_target() {
        let partial = TokioFileSystem::partial_path(Path::new("/srv/uploads/videos/tour.mp4"));
        assert_eq!(partial, PathBuf::from("/srv/uploads/videos/tour.mp4.part"));
    }
}
