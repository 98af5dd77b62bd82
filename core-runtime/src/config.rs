//! # Core Configuration Module
//!
//! Provides configuration management for the storefront core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds every dependency and setting the media and content
//! services need. It validates eagerly so a misconfigured host fails at start
//! rather than on the first upload.
//!
//! ## Required Dependencies
//!
//! - `SettingsStore` - Durable surface for the persisted content snapshot
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `HttpClient` - Provider uploads, content fetches, link probes (desktop default: reqwest)
//! - `FileSystemAccess` - Local upload root (desktop default: tokio fs)
//! - `Clock` - Time source (default: system clock)
//!
//! When the `desktop-shims` feature is enabled, a SQLite-backed `SettingsStore`
//! is created next to the database if none is provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{ContentCacheConfig, CoreConfig, ProviderCredentials};
//!
//! let config = CoreConfig::builder()
//!     .database_path("/srv/shop/media.db")
//!     .media_root("/srv/shop/public")
//!     .credentials(ProviderCredentials::from_env())
//!     .content(ContentCacheConfig::new("https://shop.example.com"))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Missing media root
//! let config = CoreConfig::builder()
//!     .database_path("/srv/shop/media.db")
//!     .build()
//!     .expect("Should fail - media root is required");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    BackendKind, Clock, FileSystemAccess, HttpClient, RetryPolicy, SettingsStore, SystemClock,
};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Shortest accepted polling interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Core configuration for the storefront core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database holding media records and blobs
    pub database_path: PathBuf,

    /// Public directory the local-filesystem backend writes under
    pub media_root: PathBuf,

    /// URL prefix under which `media_root/uploads` is served
    pub public_url_prefix: String,

    /// HTTP client (optional with desktop default)
    pub http_client: Option<Arc<dyn HttpClient>>,

    /// File system access abstraction (optional with desktop default)
    pub file_system: Option<Arc<dyn FileSystemAccess>>,

    /// Durable key-value surface (required)
    pub settings_store: Arc<dyn SettingsStore>,

    /// Time source
    pub clock: Arc<dyn Clock>,

    pub features: FeatureFlags,

    pub upload: UploadPolicy,

    pub content: ContentCacheConfig,

    pub credentials: ProviderCredentials,
}

impl fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("media_root", &self.media_root)
            .field("public_url_prefix", &self.public_url_prefix)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field(
                "file_system",
                &self
                    .file_system
                    .as_ref()
                    .map(|_| "FileSystemAccess { ... }"),
            )
            .field("settings_store", &"SettingsStore { ... }")
            .field("features", &self.features)
            .field("upload", &self.upload)
            .field("content", &self.content)
            .field("credentials", &self.credentials)
            .finish()
    }
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Run the content cache's interval scheduler on `start()`
    pub enable_polling: bool,

    /// HEAD-probe normalized links before recording them
    pub enable_link_verification: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_polling: true,
            enable_link_verification: false,
        }
    }
}

/// How uploads are pre-processed and which backends are tried, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPolicy {
    /// Backend chain walked on fallback
    pub backend_order: Vec<BackendKind>,

    /// Longest edge, in pixels, an image is shrunk to before storing
    pub max_image_edge: u32,

    /// JPEG quality used when re-encoding images (1-100)
    pub jpeg_quality: u8,

    /// Upper bound on a single backend `store` call
    pub store_timeout: Duration,

    /// Retries on the same backend for transient network failures
    pub retry: RetryPolicy,

    /// Upper bound on a link reachability probe
    pub probe_timeout: Duration,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            backend_order: vec![
                BackendKind::Cloudinary,
                BackendKind::Dropbox,
                BackendKind::ImgBb,
                BackendKind::DatabaseBlob,
                BackendKind::LocalFilesystem,
            ],
            max_image_edge: 1920,
            jpeg_quality: 85,
            store_timeout: Duration::from_secs(60),
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(250),
                max_delay: Duration::from_secs(5),
                use_exponential_backoff: true,
            },
            probe_timeout: Duration::from_secs(5),
        }
    }
}

impl UploadPolicy {
    pub fn with_backend_order(mut self, order: Vec<BackendKind>) -> Self {
        self.backend_order = order;
        self
    }

    pub fn with_max_image_edge(mut self, edge: u32) -> Self {
        self.max_image_edge = edge;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend_order.is_empty() {
            return Err(Error::Config(
                "Upload backend order cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for kind in &self.backend_order {
            if !seen.insert(*kind) {
                return Err(Error::Config(format!(
                    "Backend '{}' appears more than once in the upload order",
                    kind
                )));
            }
        }

        if self.max_image_edge == 0 {
            return Err(Error::Config(
                "Maximum image edge must be greater than 0 pixels".to_string(),
            ));
        }

        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::Config(
                "JPEG quality must be between 1 and 100".to_string(),
            ));
        }

        if self.store_timeout.is_zero() {
            return Err(Error::Config(
                "Store timeout must be greater than 0".to_string(),
            ));
        }

        if self.probe_timeout.is_zero() {
            return Err(Error::Config(
                "Probe timeout must be greater than 0".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::Config(
                "Retry policy must allow at least one attempt".to_string(),
            ));
        }

        Ok(())
    }
}

/// One read endpoint tracked by the content cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentResource {
    /// Logical name used by `get`/`update` and as the persistence key
    pub name: String,
    /// Path appended to the base URL
    pub path: String,
}

impl ContentResource {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Catalog and page resources the storefront client keeps fresh.
pub fn default_resources() -> Vec<ContentResource> {
    vec![
        ContentResource::new("products", "/api/products"),
        ContentResource::new("categories", "/api/categories"),
        ContentResource::new("farms", "/api/farms"),
        ContentResource::new("settings", "/api/settings"),
        ContentResource::new("socialLinks", "/api/social-links"),
        ContentResource::new("infoPage", "/api/pages/info"),
        ContentResource::new("contactPage", "/api/pages/contact"),
        ContentResource::new("questionsPage", "/api/pages/questions"),
    ]
}

/// Content cache configuration.
///
/// The poll interval should exceed the typical duration of one refresh
/// cycle. Ticks that fire while a cycle is still running are skipped, not
/// queued.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentCacheConfig {
    /// Origin serving the read endpoints
    pub base_url: String,

    pub resources: Vec<ContentResource>,

    /// Delay between scheduled refresh cycles
    pub poll_interval: Duration,

    /// Upper bound on a single resource fetch
    pub fetch_timeout: Duration,

    /// How long after a successful fetch a resource counts as fresh
    pub freshness_window: Duration,

    /// Prefix for persisted snapshot keys (`<prefix>.<resource>`)
    pub storage_key_prefix: String,
}

impl ContentCacheConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_resources(mut self, resources: Vec<ContentResource>) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    pub fn with_storage_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.storage_key_prefix = prefix.into();
        self
    }

    /// Absolute URL of a resource's read endpoint.
    pub fn endpoint_url(&self, resource: &ContentResource) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            resource.path.trim_start_matches('/')
        )
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.base_url).map_err(|e| {
            Error::Config(format!(
                "Content base URL '{}' is not a valid absolute URL: {}",
                self.base_url, e
            ))
        })?;

        if self.resources.is_empty() {
            return Err(Error::Config(
                "Content cache needs at least one resource".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for resource in &self.resources {
            if resource.name.trim().is_empty() {
                return Err(Error::Config(
                    "Content resource names cannot be empty".to_string(),
                ));
            }
            if !names.insert(resource.name.as_str()) {
                return Err(Error::Config(format!(
                    "Content resource '{}' is declared more than once",
                    resource.name
                )));
            }
        }

        if self.poll_interval < MIN_POLL_INTERVAL {
            return Err(Error::Config(format!(
                "Poll interval must be at least {} ms",
                MIN_POLL_INTERVAL.as_millis()
            )));
        }

        if self.fetch_timeout.is_zero() {
            return Err(Error::Config(
                "Fetch timeout must be greater than 0".to_string(),
            ));
        }

        if self.storage_key_prefix.trim().is_empty() {
            return Err(Error::Config(
                "Storage key prefix cannot be empty".to_string(),
            ));
        }

        if self.fetch_timeout >= self.poll_interval {
            warn!(
                poll_interval_ms = self.poll_interval.as_millis() as u64,
                fetch_timeout_ms = self.fetch_timeout.as_millis() as u64,
                "Fetch timeout is not shorter than the poll interval; slow cycles will skip ticks"
            );
        }

        Ok(())
    }
}

impl Default for ContentCacheConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            resources: default_resources(),
            poll_interval: Duration::from_secs(2),
            fetch_timeout: Duration::from_secs(10),
            freshness_window: Duration::from_secs(30),
            storage_key_prefix: "content_cache".to_string(),
        }
    }
}

/// Credentials for the content-addressed file host.
#[derive(Clone, PartialEq, Eq)]
pub struct DropboxCredentials {
    pub access_token: String,
}

/// Credentials for the image/video CDN.
///
/// Either `api_secret` (signed uploads) or `upload_preset` (unsigned uploads)
/// must be present.
#[derive(Clone, PartialEq, Eq)]
pub struct CloudinaryCredentials {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: Option<String>,
    pub upload_preset: Option<String>,
}

/// Credentials for the generic image host.
#[derive(Clone, PartialEq, Eq)]
pub struct ImgBbCredentials {
    pub api_key: String,
}

/// Provider credentials. A provider without credentials is left out of the
/// backend chain.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub dropbox: Option<DropboxCredentials>,
    pub cloudinary: Option<CloudinaryCredentials>,
    pub imgbb: Option<ImgBbCredentials>,
}

fn redacted<T>(value: &Option<T>) -> &'static str {
    if value.is_some() {
        "[REDACTED]"
    } else {
        "None"
    }
}

impl fmt::Debug for DropboxCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DropboxCredentials")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Debug for CloudinaryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudinaryCredentials")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &redacted(&self.api_secret))
            .field("upload_preset", &self.upload_preset)
            .finish()
    }
}

impl fmt::Debug for ImgBbCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImgBbCredentials")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("dropbox", &self.dropbox)
            .field("cloudinary", &self.cloudinary)
            .field("imgbb", &self.imgbb)
            .finish()
    }
}

impl ProviderCredentials {
    /// Read credentials from the process environment.
    ///
    /// Variables: `DROPBOX_ACCESS_TOKEN`, `CLOUDINARY_CLOUD_NAME`,
    /// `CLOUDINARY_API_KEY`, `CLOUDINARY_API_SECRET`,
    /// `CLOUDINARY_UPLOAD_PRESET`, `IMGBB_API_KEY`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build credentials from an arbitrary variable lookup. Blank values are
    /// treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let dropbox = get("DROPBOX_ACCESS_TOKEN")
            .map(|access_token| DropboxCredentials { access_token });

        let cloudinary = match (get("CLOUDINARY_CLOUD_NAME"), get("CLOUDINARY_API_KEY")) {
            (Some(cloud_name), Some(api_key)) => Some(CloudinaryCredentials {
                cloud_name,
                api_key,
                api_secret: get("CLOUDINARY_API_SECRET"),
                upload_preset: get("CLOUDINARY_UPLOAD_PRESET"),
            }),
            _ => None,
        };

        let imgbb = get("IMGBB_API_KEY").map(|api_key| ImgBbCredentials { api_key });

        Self {
            dropbox,
            cloudinary,
            imgbb,
        }
    }

    pub fn with_dropbox(mut self, access_token: impl Into<String>) -> Self {
        self.dropbox = Some(DropboxCredentials {
            access_token: access_token.into(),
        });
        self
    }

    pub fn with_cloudinary(mut self, credentials: CloudinaryCredentials) -> Self {
        self.cloudinary = Some(credentials);
        self
    }

    pub fn with_imgbb(mut self, api_key: impl Into<String>) -> Self {
        self.imgbb = Some(ImgBbCredentials {
            api_key: api_key.into(),
        });
        self
    }

    /// Whether credentials for a remote backend are configured. Local
    /// backends always report `true`.
    pub fn has(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::Dropbox => self.dropbox.is_some(),
            BackendKind::Cloudinary => self.cloudinary.is_some(),
            BackendKind::ImgBb => self.imgbb.is_some(),
            BackendKind::DatabaseBlob | BackendKind::LocalFilesystem => true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(ref cloudinary) = self.cloudinary {
            if cloudinary.api_secret.is_none() && cloudinary.upload_preset.is_none() {
                return Err(Error::Config(
                    "Cloudinary needs either CLOUDINARY_API_SECRET (signed uploads) \
                     or CLOUDINARY_UPLOAD_PRESET (unsigned uploads)"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.media_root.as_os_str().is_empty() {
            return Err(Error::Config("Media root cannot be empty".to_string()));
        }

        if !self.public_url_prefix.starts_with('/') {
            return Err(Error::Config(
                "Public URL prefix must start with '/'".to_string(),
            ));
        }

        self.upload.validate()?;
        self.content.validate()?;
        self.credentials.validate()?;

        if self.features.enable_link_verification && self.http_client.is_none() {
            return Err(Error::Config(
                "Link verification enabled but no HttpClient provided. \
                 Disable the feature or inject an HttpClient implementation."
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Backends from the configured order that can actually be built.
    pub fn available_backends(&self) -> Vec<BackendKind> {
        self.upload
            .backend_order
            .iter()
            .copied()
            .filter(|kind| self.credentials.has(*kind))
            .collect()
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn settings_store_missing_error() -> Error {
    Error::capability(
        "SettingsStore",
        "SettingsStore implementation is required to persist the content snapshot. \
         Server/desktop: enable the 'desktop-shims' feature to use the default SqliteSettingsStore. \
         Browser hosts: inject a localStorage-backed settings store.",
    )
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(
    database_path: &Path,
    media_root: &Path,
) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;
    use std::thread;
    use tokio::runtime::{Builder, Handle};

    let candidate = database_path
        .parent()
        .map(|parent| parent.join("settings.db"))
        .unwrap_or_else(|| media_root.join("settings.db"));

    let init_store = |path: PathBuf| -> Result<_> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::Internal(format!(
                    "Failed to create Tokio runtime for default settings store: {}",
                    e
                ))
            })?;

        runtime
            .block_on(SqliteSettingsStore::new(path))
            .map_err(|e| {
                Error::Internal(format!("Failed to initialize default SettingsStore: {}", e))
            })
    };

    // A runtime cannot be blocked on from inside another one
    let store = match Handle::try_current() {
        Ok(_) => {
            let path = candidate.clone();
            thread::spawn(move || init_store(path))
                .join()
                .map_err(|_| {
                    Error::Internal(
                        "Worker thread panicked while creating default SettingsStore".to_string(),
                    )
                })??
        }
        Err(_) => init_store(candidate.clone())?,
    };

    let store: Arc<dyn SettingsStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(
    _database_path: &Path,
    _media_root: &Path,
) -> Result<Arc<dyn SettingsStore>> {
    Err(settings_store_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    media_root: Option<PathBuf>,
    public_url_prefix: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    clock: Option<Arc<dyn Clock>>,
    features: FeatureFlags,
    upload: Option<UploadPolicy>,
    content: Option<ContentCacheConfig>,
    credentials: Option<ProviderCredentials>,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .database_path("/srv/shop/media.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the public directory local uploads are written under.
    pub fn media_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.media_root = Some(path.into());
        self
    }

    /// Sets the URL prefix local uploads are served from.
    ///
    /// Default: `/uploads`
    pub fn public_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.public_url_prefix = Some(prefix.into());
        self
    }

    /// Sets the HTTP client implementation.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the file system access implementation.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Sets the settings store implementation (required unless
    /// `desktop-shims` provides one).
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Sets the clock. Default: [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn enable_polling(mut self, enabled: bool) -> Self {
        self.features.enable_polling = enabled;
        self
    }

    /// Requires an `HttpClient`.
    pub fn enable_link_verification(mut self, enabled: bool) -> Self {
        self.features.enable_link_verification = enabled;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    pub fn upload_policy(mut self, policy: UploadPolicy) -> Self {
        self.upload = Some(policy);
        self
    }

    pub fn content(mut self, content: ContentCacheConfig) -> Self {
        self.content = Some(content);
        self
    }

    pub fn credentials(mut self, credentials: ProviderCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns an error if:
    /// - The database path or media root is missing
    /// - No `SettingsStore` is available
    /// - Any sub-configuration is invalid
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let media_root = self.media_root.ok_or_else(|| {
            Error::Config("Media root is required. Use .media_root() to set it.".to_string())
        })?;

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(&database_path, &media_root)?,
        };

        let config = CoreConfig {
            database_path,
            media_root,
            public_url_prefix: self
                .public_url_prefix
                .unwrap_or_else(|| "/uploads".to_string()),
            http_client: self.http_client,
            file_system: self.file_system,
            settings_store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            features: self.features,
            upload: self.upload.unwrap_or_default(),
            content: self.content.unwrap_or_default(),
            credentials: self.credentials.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::BridgeError;
    use std::collections::HashMap;

    #[cfg(feature = "desktop-shims")]
    use tokio::runtime::Runtime;
    #[cfg(feature = "desktop-shims")]
    use uuid::Uuid;

    mockall::mock! {
        Settings {}

        #[async_trait]
        impl SettingsStore for Settings {
            async fn set_string(&self, key: &str, value: &str) -> std::result::Result<(), BridgeError>;
            async fn get_string(&self, key: &str) -> std::result::Result<Option<String>, BridgeError>;
            async fn set_i64(&self, key: &str, value: i64) -> std::result::Result<(), BridgeError>;
            async fn get_i64(&self, key: &str) -> std::result::Result<Option<i64>, BridgeError>;
            async fn delete(&self, key: &str) -> std::result::Result<(), BridgeError>;
            async fn list_keys(&self) -> std::result::Result<Vec<String>, BridgeError>;
        }
    }

    fn base_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .database_path("/srv/shop/media.db")
            .media_root("/srv/shop/public")
            .settings_store(Arc::new(MockSettings::new()))
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_build_with_desktop_settings_default() {
        let base = std::env::temp_dir().join(format!("core-runtime-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&base).unwrap();

        let config = CoreConfig::builder()
            .database_path(base.join("media.db"))
            .media_root(base.join("public"))
            .build()
            .expect("desktop defaults should succeed");

        let settings = config.settings_store.clone();
        let rt = Runtime::new().expect("runtime");
        rt.block_on(async {
            settings.set_string("content_cache.products", "[]").await.unwrap();
            let value = settings.get_string("content_cache.products").await.unwrap();
            assert_eq!(value.as_deref(), Some("[]"));
        });

        drop(config);
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_builder_requires_database_path() {
        let result = CoreConfig::builder()
            .media_root("/srv/shop/public")
            .settings_store(Arc::new(MockSettings::new()))
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Database path is required"));
    }

    #[test]
    fn test_builder_requires_media_root() {
        let result = CoreConfig::builder()
            .database_path("/srv/shop/media.db")
            .settings_store(Arc::new(MockSettings::new()))
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Media root is required"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_settings_store() {
        let result = CoreConfig::builder()
            .database_path("/srv/shop/media.db")
            .media_root("/srv/shop/public")
            .build();

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("SettingsStore"));
        assert!(err_msg.contains("content snapshot"));
    }

    #[test]
    fn test_builder_defaults() {
        let config = base_builder().build().unwrap();

        assert_eq!(config.public_url_prefix, "/uploads");
        assert_eq!(config.upload.max_image_edge, 1920);
        assert_eq!(config.upload.jpeg_quality, 85);
        assert_eq!(config.content.poll_interval, Duration::from_secs(2));
        assert_eq!(config.content.resources.len(), 8);
        assert!(config.features.enable_polling);
        assert!(!config.features.enable_link_verification);
    }

    #[test]
    fn test_available_backends_skip_missing_credentials() {
        let config = base_builder()
            .credentials(ProviderCredentials::default().with_imgbb("key"))
            .build()
            .unwrap();

        assert_eq!(
            config.available_backends(),
            vec![
                BackendKind::ImgBb,
                BackendKind::DatabaseBlob,
                BackendKind::LocalFilesystem
            ]
        );
    }

    #[test]
    fn test_validate_rejects_empty_backend_order() {
        let result = base_builder()
            .upload_policy(UploadPolicy::default().with_backend_order(Vec::new()))
            .build();

        assert!(result.unwrap_err().to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_validate_rejects_duplicate_backend() {
        let result = base_builder()
            .upload_policy(UploadPolicy::default().with_backend_order(vec![
                BackendKind::LocalFilesystem,
                BackendKind::LocalFilesystem,
            ]))
            .build();

        assert!(result.unwrap_err().to_string().contains("more than once"));
    }

    #[test]
    fn test_validate_rejects_bad_jpeg_quality() {
        let result = base_builder()
            .upload_policy(UploadPolicy::default().with_jpeg_quality(0))
            .build();

        assert!(result.unwrap_err().to_string().contains("JPEG quality"));
    }

    #[test]
    fn test_validate_rejects_short_poll_interval() {
        let result = base_builder()
            .content(ContentCacheConfig::default().with_poll_interval(Duration::from_millis(10)))
            .build();

        assert!(result.unwrap_err().to_string().contains("Poll interval"));
    }

    #[test]
    fn test_validate_rejects_duplicate_resource() {
        let result = base_builder()
            .content(ContentCacheConfig::default().with_resources(vec![
                ContentResource::new("products", "/api/products"),
                ContentResource::new("products", "/api/v2/products"),
            ]))
            .build();

        assert!(result.unwrap_err().to_string().contains("declared more than once"));
    }

    #[test]
    fn test_validate_rejects_relative_base_url() {
        let result = base_builder()
            .content(ContentCacheConfig::new("shop.example.com"))
            .build();

        assert!(result.unwrap_err().to_string().contains("not a valid absolute URL"));
    }

    #[test]
    fn test_link_verification_requires_http_client() {
        let result = base_builder().enable_link_verification(true).build();

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("Link verification enabled"));
        assert!(err_msg.contains("HttpClient"));
    }

    #[test]
    fn test_endpoint_url_joins_without_double_slash() {
        let content = ContentCacheConfig::new("https://shop.example.com/");
        let url = content.endpoint_url(&ContentResource::new("farms", "/api/farms"));

        assert_eq!(url, "https://shop.example.com/api/farms");
    }

    #[test]
    fn test_credentials_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DROPBOX_ACCESS_TOKEN", "sl.token"),
            ("CLOUDINARY_CLOUD_NAME", "shop"),
            ("CLOUDINARY_API_KEY", "123"),
            ("CLOUDINARY_UPLOAD_PRESET", "unsigned"),
            ("IMGBB_API_KEY", "   "),
        ]);

        let creds = ProviderCredentials::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert!(creds.has(BackendKind::Dropbox));
        assert!(creds.has(BackendKind::Cloudinary));
        assert!(!creds.has(BackendKind::ImgBb));
        assert_eq!(
            creds.cloudinary.as_ref().unwrap().upload_preset.as_deref(),
            Some("unsigned")
        );
        assert!(creds.validate().is_ok());
    }

    #[test]
    fn test_cloudinary_requires_secret_or_preset() {
        let creds = ProviderCredentials::default().with_cloudinary(CloudinaryCredentials {
            cloud_name: "shop".to_string(),
            api_key: "123".to_string(),
            api_secret: None,
            upload_preset: None,
        });

        assert!(creds.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = ProviderCredentials::default()
            .with_dropbox("sl.very-secret")
            .with_imgbb("imgbb-secret");

        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("imgbb-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_config_is_cloneable() {
        let config = base_builder().build().unwrap();

        let cloned = config.clone();
        assert_eq!(cloned.database_path, config.database_path);
        assert_eq!(cloned.upload, config.upload);
    }
}
