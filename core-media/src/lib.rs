//! # Core Media
//!
//! Storage-side half of the storefront core:
//!
//! - [`links`]: share-link normalization, link analysis and catalog link repair
//! - [`classify`]: image/video classification from URLs
//! - [`probe`]: optional `HEAD` reachability checks for rewritten links
//! - [`processing`]: one-time image re-encoding and unique stored names
//! - [`repository`]: SQLite media metadata with atomic access counters
//! - [`tracker`]: fire-and-forget access tracking for read paths
//! - [`backends`]: the database-blob and local-filesystem storage backends
//! - [`upload`]: the orchestrator that walks the backend chain
//!
//! Remote providers (`provider-dropbox`, `provider-cloudinary`,
//! `provider-imgbb`) plug into [`upload::UploadOrchestrator`] through the
//! shared [`bridge_traits::StorageBackend`] contract.

pub mod backends;
pub mod classify;
pub mod db;
pub mod error;
pub mod links;
pub mod models;
pub mod probe;
pub mod processing;
pub mod repository;
pub mod tracker;
pub mod upload;

pub use error::{BackendAttempt, MediaError, Result, UploadFailure};
pub use links::{analyze, normalize, normalize_links_in_value, LinkAnalysis, LinkFix};
pub use models::{MediaId, MediaOrder, MediaQuery, MediaRecord, UploadReceipt};
pub use repository::{MediaRepository, SqliteMediaRepository};
pub use tracker::{AccessEvent, AccessTracker};
pub use upload::{UploadOrchestrator, UploadOutcome, UploadRequest};
