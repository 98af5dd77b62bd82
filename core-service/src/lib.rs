//! Core service façade and bootstrap helpers.
//!
//! This crate wires a [`CoreConfig`] and the host-provided bridges (HTTP,
//! filesystem, settings, clock) into one [`CoreService`]: the media
//! upload pipeline, the media library, and the polling content cache, all
//! publishing on one shared [`EventBus`]. Desktop and server hosts enable the
//! `desktop-shims` feature, which supplies `bridge-desktop` defaults for any
//! bridge the config leaves out.
//!
//! ```ignore
//! use core_service::bootstrap_desktop;
//!
//! let core = bootstrap_desktop("/srv/shop/media.db", "/srv/shop/public", "https://shop.example.com").await?;
//! core.start().await?;
//!
//! let outcome = core.upload(UploadRequest::new(bytes, MediaKind::Image, "oranges.png")).await?;
//! println!("stored at {}", outcome.record.direct_url);
//! ```

pub mod error;

pub use error::{CoreError, Result};

use bridge_traits::{
    BackendKind, FileSystemAccess, HttpClient, MediaKind, StorageBackend,
};
use core_content::{ContentCache, HttpResourceFetcher, RefreshReport, ResourceState};
use core_media::backends::{BlobContent, DatabaseBlobBackend, LocalFilesystemBackend};
use core_media::db::{create_pool, DatabaseConfig};
use core_media::probe::{HttpLinkProbe, LinkProbe};
use core_media::{
    analyze, normalize_links_in_value, AccessEvent, AccessTracker, LinkAnalysis, LinkFix,
    MediaId, MediaQuery, MediaRecord, MediaRepository, SqliteMediaRepository,
    UploadOrchestrator, UploadOutcome, UploadRequest,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CacheSnapshot, CoreEvent, EventBus, Receiver, Subscription};
use provider_cloudinary::CloudinaryConnector;
use provider_dropbox::DropboxConnector;
use provider_imgbb::ImgBbConnector;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Primary façade exposed to host applications.
///
/// Cheap to clone; clones share the same pool, cache and event bus.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<CoreConfig>,
    events: EventBus,
    repository: Arc<SqliteMediaRepository>,
    tracker: AccessTracker,
    blobs: Arc<DatabaseBlobBackend>,
    orchestrator: Arc<UploadOrchestrator>,
    probe: Option<Arc<dyn LinkProbe>>,
    content: Option<ContentCache>,
}

impl CoreService {
    /// Open the media database and assemble every component.
    ///
    /// Remote providers are registered only when their credentials are
    /// configured and an HTTP client is available. Without an HTTP client
    /// the content cache is disabled.
    #[instrument(skip(config), fields(database = %config.database_path.display()))]
    pub async fn new(config: CoreConfig) -> Result<Self> {
        let http_client = resolve_http_client(&config);
        let file_system = resolve_file_system(&config);

        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
        let repository = Arc::new(SqliteMediaRepository::new(pool.clone(), Arc::clone(&config.clock)));
        let tracker = AccessTracker::new(repository.clone());
        let blobs = Arc::new(
            DatabaseBlobBackend::new(pool, Arc::clone(&config.clock)).with_tracker(tracker.clone()),
        );

        let events = EventBus::default();
        let backends = build_backends(&config, http_client.clone(), file_system, blobs.clone());
        info!(
            backends = ?backends.iter().map(|b| b.kind()).collect::<Vec<_>>(),
            "Storage backends registered"
        );

        let probe: Option<Arc<dyn LinkProbe>> = match (&http_client, config.features.enable_link_verification) {
            (Some(client), true) => Some(Arc::new(HttpLinkProbe::new(
                Arc::clone(client),
                config.upload.probe_timeout,
            ))),
            _ => None,
        };

        let mut orchestrator = UploadOrchestrator::new(
            backends,
            repository.clone(),
            Arc::clone(&config.clock),
            config.upload.clone(),
        )
        .with_event_bus(events.clone());
        if let Some(probe) = &probe {
            orchestrator = orchestrator.with_probe(Arc::clone(probe));
        }

        let content = match &http_client {
            Some(client) => Some(ContentCache::new(
                config.content.clone(),
                Arc::new(HttpResourceFetcher::new(Arc::clone(client), &config.content)),
                Arc::clone(&config.settings_store),
                events.clone(),
                Arc::clone(&config.clock),
            )),
            None => {
                warn!("No HttpClient available; content cache disabled");
                None
            }
        };

        Ok(Self {
            config: Arc::new(config),
            events,
            repository,
            tracker,
            blobs,
            orchestrator: Arc::new(orchestrator),
            probe,
            content,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Hydrate the content cache and start polling, when enabled.
    pub async fn start(&self) -> Result<()> {
        match &self.content {
            Some(cache) if self.config.features.enable_polling => cache.start().await?,
            Some(cache) => {
                cache.hydrate().await?;
                info!("Polling disabled; content cache hydrated only");
            }
            None => {}
        }
        Ok(())
    }

    pub async fn stop(&self) {
        if let Some(cache) = &self.content {
            cache.stop().await;
        }
    }

    // ----- Media -----

    /// Store a file on the first backend of the chain that accepts it.
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadOutcome> {
        Ok(self.orchestrator.upload(request).await?)
    }

    /// Backend kinds an upload would try, in order.
    pub fn backend_chain(&self, preferred: Option<BackendKind>) -> Vec<BackendKind> {
        self.orchestrator.chain_for(preferred)
    }

    /// Count a read of `url`. Never waits and never fails.
    pub fn track_access(&self, url: impl Into<String>, kind: Option<MediaKind>) {
        let _ = self.tracker.track(AccessEvent::new(url, kind));
    }

    /// Bytes of a database-stored file, for the `/api/media/{id}` route.
    pub async fn read_blob(&self, id: &str) -> Result<Option<BlobContent>> {
        Ok(self.blobs.read(id).await?)
    }

    pub async fn media(&self, id: &MediaId) -> Result<Option<MediaRecord>> {
        Ok(self.repository.find_by_id(id).await?)
    }

    pub async fn list_media(&self, query: MediaQuery) -> Result<Vec<MediaRecord>> {
        Ok(self.repository.query(query).await?)
    }

    pub async fn media_count(&self) -> Result<u64> {
        Ok(self.repository.count().await?)
    }

    // ----- Links -----

    pub fn analyze_link(&self, url: &str) -> LinkAnalysis {
        analyze(url)
    }

    /// `None` when link verification is disabled.
    pub async fn verify_link(&self, url: &str) -> Option<bool> {
        match &self.probe {
            Some(probe) => Some(probe.is_reachable(&analyze(url).direct_url).await),
            None => None,
        }
    }

    /// Rewrite every provider share-link inside a JSON document.
    pub fn repair_links(&self, document: &mut Value) -> Vec<LinkFix> {
        let fixes = normalize_links_in_value(document);
        if !fixes.is_empty() {
            info!(count = fixes.len(), "Repaired share links");
        }
        fixes
    }

    // ----- Content -----

    fn content(&self) -> Result<&ContentCache> {
        self.content.as_ref().ok_or_else(|| {
            CoreError::capability(
                "HttpClient",
                "The content cache needs an HttpClient. Inject one through \
                 CoreConfig::builder().http_client() or enable 'desktop-shims'.",
            )
        })
    }

    pub fn content_enabled(&self) -> bool {
        self.content.is_some()
    }

    pub fn get_content(&self, resource: &str) -> Option<Value> {
        self.content.as_ref().and_then(|cache| cache.get(resource))
    }

    pub fn content_snapshot(&self) -> CacheSnapshot {
        self.content
            .as_ref()
            .map(ContentCache::snapshot)
            .unwrap_or_default()
    }

    pub fn content_state(&self, resource: &str) -> ResourceState {
        self.content
            .as_ref()
            .map(|cache| cache.state(resource))
            .unwrap_or(ResourceState::Empty)
    }

    /// `Ok(None)` when a cycle was already running.
    pub async fn refresh_content(&self) -> Result<Option<RefreshReport>> {
        Ok(self.content()?.refresh_all().await)
    }

    pub async fn update_content(&self, resource: &str, value: Value) -> Result<()> {
        Ok(self.content()?.update(resource, value).await?)
    }

    /// Call after an admin write so the next poll repopulates the cache.
    pub async fn invalidate_content(&self) -> Result<()> {
        Ok(self.content()?.invalidate().await?)
    }

    // ----- Events -----

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Raw receiver; dropping it unsubscribes.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.events.subscribe()
    }

    /// Run `handler` for every event until the returned handle is dropped.
    pub fn listen<F>(&self, handler: F) -> Subscription
    where
        F: Fn(CoreEvent) + Send + Sync + 'static,
    {
        self.events.listen(handler)
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("backends", &self.orchestrator.chain_for(None))
            .field("link_verification", &self.probe.is_some())
            .field("content", &self.content)
            .finish()
    }
}

fn resolve_http_client(config: &CoreConfig) -> Option<Arc<dyn HttpClient>> {
    config.http_client.clone().or_else(default_http_client)
}

fn resolve_file_system(config: &CoreConfig) -> Option<Arc<dyn FileSystemAccess>> {
    config
        .file_system
        .clone()
        .or_else(|| default_file_system(&config.media_root))
}

#[cfg(feature = "desktop-shims")]
fn default_http_client() -> Option<Arc<dyn HttpClient>> {
    Some(Arc::new(bridge_desktop::ReqwestHttpClient::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn default_http_client() -> Option<Arc<dyn HttpClient>> {
    None
}

#[cfg(feature = "desktop-shims")]
fn default_file_system(media_root: &std::path::Path) -> Option<Arc<dyn FileSystemAccess>> {
    Some(Arc::new(bridge_desktop::TokioFileSystem::with_data_directory(
        media_root.to_path_buf(),
    )))
}

#[cfg(not(feature = "desktop-shims"))]
fn default_file_system(_media_root: &std::path::Path) -> Option<Arc<dyn FileSystemAccess>> {
    None
}

fn build_backends(
    config: &CoreConfig,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    blobs: Arc<DatabaseBlobBackend>,
) -> Vec<Arc<dyn StorageBackend>> {
    let mut backends: Vec<Arc<dyn StorageBackend>> = vec![blobs];

    match file_system {
        Some(fs) => {
            let root = config
                .media_root
                .join(config.public_url_prefix.trim_start_matches('/'));
            backends.push(Arc::new(LocalFilesystemBackend::new(
                fs,
                root,
                config.public_url_prefix.clone(),
            )));
        }
        None => warn!("No FileSystemAccess available; local filesystem backend disabled"),
    }

    let Some(client) = http_client else {
        warn!("No HttpClient available; remote providers disabled");
        return backends;
    };

    let credentials = &config.credentials;
    if let Some(dropbox) = &credentials.dropbox {
        backends.push(Arc::new(DropboxConnector::from_credentials(
            Arc::clone(&client),
            dropbox,
        )));
    }
    if let Some(cloudinary) = &credentials.cloudinary {
        backends.push(Arc::new(CloudinaryConnector::new(
            Arc::clone(&client),
            cloudinary.clone(),
            Arc::clone(&config.clock),
        )));
    }
    if let Some(imgbb) = &credentials.imgbb {
        backends.push(Arc::new(ImgBbConnector::from_credentials(
            Arc::clone(&client),
            imgbb,
        )));
    }

    backends
}

/// Build a service with desktop bridges and provider credentials read from
/// the environment.
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(
    database_path: impl Into<std::path::PathBuf>,
    media_root: impl Into<std::path::PathBuf>,
    content_base_url: impl Into<String>,
) -> Result<CoreService> {
    use core_runtime::config::{ContentCacheConfig, ProviderCredentials};

    let media_root = media_root.into();
    let config = CoreConfig::builder()
        .database_path(database_path)
        .media_root(media_root.clone())
        .http_client(Arc::new(bridge_desktop::ReqwestHttpClient::new()))
        .file_system(Arc::new(bridge_desktop::TokioFileSystem::with_data_directory(
            media_root,
        )))
        .credentials(ProviderCredentials::from_env())
        .content(ContentCacheConfig::new(content_base_url))
        .build()
        .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;

    CoreService::new(config).await
}
