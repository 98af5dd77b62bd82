//! # Desktop Bridges
//!
//! Host capabilities for running the storefront core as a regular process
//! (server or desktop):
//!
//! - [`ReqwestHttpClient`]: provider uploads, content polling and link probes
//! - [`TokioFileSystem`]: the local media root, written via rename-into-place
//! - [`SqliteSettingsStore`]: the persisted content snapshot
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .http_client(Arc::new(ReqwestHttpClient::new()))
//!     .file_system(Arc::new(TokioFileSystem::with_data_directory("/srv/shop")))
//!     .settings_store(Arc::new(SqliteSettingsStore::new("/srv/shop/settings.db".into()).await?))
//!     .build()?;
//! ```

mod filesystem;
mod http;
mod settings;

pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
pub use settings::SqliteSettingsStore;
