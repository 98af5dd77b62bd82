//! Local filesystem backend.
//!
//! Files land under `<root>/<kind>s/<name>` and are served from
//! `<public prefix>/<kind>s/<name>`.

use async_trait::async_trait;
use bridge_traits::{
    BackendKind, FileSystemAccess, MediaKind, StorageBackend, StoreError, StoreRequest,
    StoreResult, StoredObject,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, instrument};

pub const LOCAL_MAX_BYTES: u64 = 150 * 1024 * 1024;

const ACCEPTED: &[MediaKind] = &[MediaKind::Image, MediaKind::Video];

pub struct LocalFilesystemBackend {
    fs: Arc<dyn FileSystemAccess>,
    root: PathBuf,
    public_prefix: String,
}

impl LocalFilesystemBackend {
    pub fn new(fs: Arc<dyn FileSystemAccess>, root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        let prefix: String = public_prefix.into();
        Self {
            fs,
            root: root.into(),
            public_prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    fn public_url(&self, kind: MediaKind, file_name: &str) -> String {
        format!("{}/{}/{}", self.public_prefix, kind.folder(), file_name)
    }
}

#[async_trait]
impl StorageBackend for LocalFilesystemBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::LocalFilesystem
    }

    fn max_bytes(&self) -> u64 {
        LOCAL_MAX_BYTES
    }

    fn accepted_kinds(&self) -> &'static [MediaKind] {
        ACCEPTED
    }

    #[instrument(skip(self, request), fields(file_name = %request.file_name, size = request.size()))]
    async fn store(&self, request: StoreRequest) -> StoreResult<StoredObject> {
        if request.file_name.contains(|c: char| c == '/' || c == '\\') || request.file_name.starts_with('.') {
            return Err(StoreError::PermanentProvider(format!(
                "refusing unsafe file name {:?}",
                request.file_name
            )));
        }

        let dir = self.root.join(request.kind.folder());
        let path = dir.join(&request.file_name);

        self.fs
            .create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::PermanentProvider(format!("cannot create {}: {}", dir.display(), e)))?;
        self.fs
            .write_file(&path, request.bytes)
            .await
            .map_err(|e| StoreError::PermanentProvider(format!("cannot write {}: {}", path.display(), e)))?;

        debug!(path = %path.display(), "Stored file locally");
        Ok(StoredObject::new(self.public_url(request.kind, &request.file_name))
            .with_provider_id(path.display().to_string()))
    }
}
