//! Content cache.
//!
//! ```text
//!   get() ──────────────► snapshot (RwLock, never awaits)
//!                              ▲
//!   refresh_all() ─ guard ─► join_all(fetch) ─► merge ─► persist ─► CacheEvent::Refreshed
//!   update()      ─────────────────────────────► merge ─► persist ─► CacheEvent::Updated
//!   invalidate()  ─────────────────────────────► clear ─► clear   ─► CacheEvent::Invalidated
//! ```
//!
//! Merges, updates and invalidations are serialized by one async mutex. At
//! most one refresh cycle runs at a time: a call that finds a cycle in flight
//! returns immediately without fetching. A resource written by `update()`
//! after a cycle started keeps the written value when that cycle merges; only
//! a later cycle replaces it. The scheduler ticks at a fixed
//! interval and skips ticks that land while a cycle is still running, so a
//! poll interval shorter than a cycle loses ticks rather than queueing them.

use bridge_traits::{Clock, SettingsStore};
use core_runtime::config::{ContentCacheConfig, ContentResource};
use core_runtime::events::{CacheEvent, CacheSnapshot, CoreEvent, EventBus};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{ContentError, Result};
use crate::fetcher::ResourceFetcher;
use crate::persistence::SnapshotStore;

/// Where a resource stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// Never fetched (or invalidated since)
    Empty,
    /// A value is available but older than the freshness window, hydrated
    /// from disk, or written locally and not yet confirmed by a fetch
    Stale,
    /// Fetched successfully within the freshness window
    Fresh,
}

/// Outcome of one completed refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub cycle: u64,
    pub refreshed: Vec<String>,
    pub failed: Vec<String>,
}

struct Scheduler {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    config: ContentCacheConfig,
    fetcher: Arc<dyn ResourceFetcher>,
    store: SnapshotStore,
    events: EventBus,
    clock: Arc<dyn Clock>,
    snapshot: RwLock<CacheSnapshot>,
    /// Millis of the last successful fetch, per resource
    fetched_at: RwLock<HashMap<String, i64>>,
    last_refreshed_at: RwLock<Option<i64>>,
    in_flight: AtomicBool,
    cycles: AtomicU64,
    /// Bumped by every `update()`
    generation: AtomicU64,
    /// Generation of the last `update()`, per resource
    updated_at: RwLock<HashMap<String, u64>>,
    mutation: tokio::sync::Mutex<()>,
    scheduler: Mutex<Option<Scheduler>>,
}

/// Clears the in-flight flag when the cycle ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Polling cache over the storefront's read endpoints.
///
/// Cheap to clone; clones share state. Construct once at startup, then call
/// [`start`](Self::start) to hydrate from disk and begin polling.
///
/// # Example
///
/// ```ignore
/// let cache = ContentCache::new(config, fetcher, settings, events.clone(), clock);
/// cache.start().await?;
///
/// if let Some(products) = cache.get("products") {
///     render(products);
/// }
/// ```
#[derive(Clone)]
pub struct ContentCache {
    inner: Arc<Inner>,
}

impl ContentCache {
    pub fn new(
        config: ContentCacheConfig,
        fetcher: Arc<dyn ResourceFetcher>,
        settings: Arc<dyn SettingsStore>,
        events: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = SnapshotStore::new(settings, config.storage_key_prefix.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                fetcher,
                store,
                events,
                clock,
                snapshot: RwLock::new(CacheSnapshot::new()),
                fetched_at: RwLock::new(HashMap::new()),
                last_refreshed_at: RwLock::new(None),
                in_flight: AtomicBool::new(false),
                cycles: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                updated_at: RwLock::new(HashMap::new()),
                mutation: tokio::sync::Mutex::new(()),
                scheduler: Mutex::new(None),
            }),
        }
    }

    pub fn resources(&self) -> &[ContentResource] {
        &self.inner.config.resources
    }

    fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.inner.config.resources.iter().map(|r| r.name.as_str())
    }

    fn is_known(&self, resource: &str) -> bool {
        self.resource_names().any(|name| name == resource)
    }

    /// Last known value of a resource, possibly stale.
    pub fn get(&self, resource: &str) -> Option<Value> {
        self.inner.snapshot.read().get(resource).cloned()
    }

    /// Typed variant of [`get`](Self::get).
    pub fn get_as<T: DeserializeOwned>(&self, resource: &str) -> Result<Option<T>> {
        self.get(resource)
            .map(|value| {
                serde_json::from_value(value).map_err(|e| ContentError::decode(resource, e.to_string()))
            })
            .transpose()
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        self.inner.snapshot.read().clone()
    }

    pub fn state(&self, resource: &str) -> ResourceState {
        if !self.inner.snapshot.read().contains(resource) {
            return ResourceState::Empty;
        }

        let window = self.inner.config.freshness_window.as_millis() as i64;
        let now = self.inner.clock.unix_timestamp_millis();
        match self.inner.fetched_at.read().get(resource) {
            Some(at) if now - at <= window => ResourceState::Fresh,
            _ => ResourceState::Stale,
        }
    }

    /// Unix millis of the last completed cycle, including one restored from disk.
    pub fn last_refreshed_at(&self) -> Option<i64> {
        *self.inner.last_refreshed_at.read()
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Run one refresh cycle.
    ///
    /// Returns `None` without fetching anything when a cycle is already in
    /// flight. Resources that fail keep their last known value.
    #[instrument(skip(self))]
    pub async fn refresh_all(&self) -> Option<RefreshReport> {
        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Refresh already in flight, skipping");
            return None;
        }
        let _in_flight = InFlight(&self.inner.in_flight);
        let started_at = self.inner.generation.load(Ordering::Acquire);

        let results = join_all(
            self.inner
                .config
                .resources
                .iter()
                .map(|resource| self.fetch_one(resource)),
        )
        .await;

        let _mutation = self.inner.mutation.lock().await;
        let now = self.inner.clock.unix_timestamp_millis();
        let mut refreshed = Vec::new();
        let mut failed = Vec::new();
        {
            let mut snapshot = self.inner.snapshot.write();
            let mut fetched_at = self.inner.fetched_at.write();
            let updated_at = self.inner.updated_at.read();
            for (resource, result) in self.inner.config.resources.iter().zip(results) {
                let edited = updated_at
                    .get(&resource.name)
                    .is_some_and(|&generation| generation > started_at);
                match result {
                    Ok(_) if edited => {
                        debug!(resource = %resource.name, "Updated during cycle, keeping local value");
                    }
                    Ok(value) => {
                        snapshot.insert(resource.name.clone(), value);
                        fetched_at.insert(resource.name.clone(), now);
                        refreshed.push(resource.name.clone());
                    }
                    Err(e) => {
                        debug!(resource = %resource.name, error = %e, "Keeping last known value");
                        failed.push(resource.name.clone());
                    }
                }
            }
        }
        *self.inner.last_refreshed_at.write() = Some(now);

        let snapshot = self.snapshot();
        if let Err(e) = self.inner.store.save_all(&snapshot, now).await {
            warn!(error = %e, "Failed to persist snapshot");
        }

        let cycle = self.inner.cycles.fetch_add(1, Ordering::AcqRel) + 1;
        if failed.is_empty() {
            debug!(cycle, resources = refreshed.len(), "Refresh cycle completed");
        } else {
            warn!(cycle, failed = ?failed, "Refresh cycle completed with failures");
        }
        self.emit(CacheEvent::Refreshed {
            cycle,
            snapshot,
            refreshed: refreshed.clone(),
            failed: failed.clone(),
        });

        Some(RefreshReport {
            cycle,
            refreshed,
            failed,
        })
    }

    async fn fetch_one(&self, resource: &ContentResource) -> Result<Value> {
        let timeout = self.inner.config.fetch_timeout;
        match tokio::time::timeout(timeout, self.inner.fetcher.fetch(resource)).await {
            Ok(result) => result,
            Err(_) => Err(ContentError::fetch(
                &resource.name,
                format!("no response within {} ms", timeout.as_millis()),
            )),
        }
    }

    /// Optimistic local write, visible to [`get`](Self::get) immediately.
    ///
    /// The next cycle that starts after this call overwrites it with the
    /// fetched value; a cycle already in flight leaves it alone. The value is
    /// applied and announced even when persisting it fails; that failure is
    /// returned.
    #[instrument(skip(self, value))]
    pub async fn update(&self, resource: &str, value: Value) -> Result<()> {
        if !self.is_known(resource) {
            return Err(ContentError::UnknownResource(resource.to_string()));
        }

        let _mutation = self.inner.mutation.lock().await;
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner
            .updated_at
            .write()
            .insert(resource.to_string(), generation);
        self.inner
            .snapshot
            .write()
            .insert(resource.to_string(), value.clone());

        self.emit(CacheEvent::Updated {
            resource: resource.to_string(),
            snapshot: self.snapshot(),
        });

        self.inner.store.save(resource, &value).await
    }

    /// Drop the in-memory and persisted snapshot. Does not fetch.
    #[instrument(skip(self))]
    pub async fn invalidate(&self) -> Result<()> {
        let _mutation = self.inner.mutation.lock().await;
        self.inner.snapshot.write().clear();
        self.inner.fetched_at.write().clear();
        self.inner.updated_at.write().clear();
        *self.inner.last_refreshed_at.write() = None;

        let cleared = self.inner.store.clear().await.map(|_| ());
        info!("Content cache invalidated");
        self.emit(CacheEvent::Invalidated);
        cleared
    }

    /// Load persisted values for resources that have nothing in memory yet.
    /// Returns how many were restored.
    #[instrument(skip(self))]
    pub async fn hydrate(&self) -> Result<usize> {
        let _mutation = self.inner.mutation.lock().await;
        let persisted = self.inner.store.load(self.resource_names()).await?;
        let refreshed_at = self.inner.store.refreshed_at().await?;

        let mut restored = 0;
        {
            let mut snapshot = self.inner.snapshot.write();
            for (resource, value) in persisted.iter() {
                if !snapshot.contains(resource) {
                    snapshot.insert(resource, value.clone());
                    restored += 1;
                }
            }
        }

        let mut last = self.inner.last_refreshed_at.write();
        if last.is_none() {
            *last = refreshed_at;
        }
        debug!(restored, "Hydrated snapshot from disk");
        Ok(restored)
    }

    /// Hydrate from disk and start polling. Calling it again while polling is
    /// a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.is_running() {
            debug!("Content polling already running");
            return Ok(());
        }

        if let Err(e) = self.hydrate().await {
            warn!(error = %e, "Could not hydrate content cache from disk");
        }

        let mut scheduler = self.inner.scheduler.lock();
        if scheduler.is_some() {
            return Ok(());
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(self.clone().poll(token.clone()));
        *scheduler = Some(Scheduler { token, handle });

        info!(
            interval_ms = self.inner.config.poll_interval.as_millis() as u64,
            resources = self.inner.config.resources.len(),
            "Content polling started"
        );
        Ok(())
    }

    async fn poll(self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.inner.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            // A started cycle always runs to completion
            self.refresh_all().await;
        }
    }

    /// Stop polling, waiting for a cycle in flight to finish.
    pub async fn stop(&self) {
        let scheduler = self.inner.scheduler.lock().take();
        if let Some(Scheduler { token, handle }) = scheduler {
            token.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "Content polling task ended abnormally");
            }
            info!("Content polling stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.scheduler.lock().is_some()
    }

    fn emit(&self, event: CacheEvent) {
        // No subscribers is fine
        let _ = self.inner.events.emit(CoreEvent::Cache(event));
    }
}

impl std::fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCache")
            .field("resources", &self.inner.config.resources.len())
            .field("cached", &self.inner.snapshot.read().len())
            .field("refreshing", &self.is_refreshing())
            .field("running", &self.is_running())
            .finish()
    }
}
