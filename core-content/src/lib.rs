//! # Core Content
//!
//! Client-side cache of the storefront's read endpoints (catalog, settings,
//! content pages).
//!
//! ## Overview
//!
//! - [`fetcher`]: pulls one resource's current value from its endpoint
//! - [`persistence`]: one serialized blob per resource in the host's
//!   [`bridge_traits::SettingsStore`], used for instant paint on cold start
//! - [`cache`]: the [`ContentCache`] itself: non-blocking reads, guarded
//!   refresh cycles, optimistic updates, invalidation and the polling
//!   scheduler
//!
//! Change notifications go out on the shared
//! [`core_runtime::events::EventBus`] as [`core_runtime::events::CacheEvent`]s.

pub mod cache;
pub mod error;
pub mod fetcher;
pub mod persistence;

pub use cache::{ContentCache, RefreshReport, ResourceState};
pub use error::{ContentError, Result};
pub use fetcher::{HttpResourceFetcher, ResourceFetcher};
pub use persistence::SnapshotStore;
