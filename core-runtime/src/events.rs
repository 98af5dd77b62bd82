//! # Event Bus System
//!
//! In-process publish/subscribe built on `tokio::sync::broadcast`. The content
//! cache announces snapshot changes here and the upload orchestrator announces
//! stored media, so views and background jobs can react without polling the
//! services directly.
//!
//! ## Overview
//!
//! - **Event Types**: [`CoreEvent`] wrapping [`CacheEvent`] and [`MediaEvent`]
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Receiver wrapper with filtering
//! - **Subscription**: Callback listener whose handle unsubscribes when dropped
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    emit     ┌───────────┐   subscribe   ┌────────────┐
//! │ ContentCache ├────────────>│           ├──────────────>│ EventStream│
//! └──────────────┘             │ EventBus  │               └────────────┘
//! ┌──────────────┐    emit     │ (broadcast│    listen     ┌────────────┐
//! │ Orchestrator ├────────────>│  channel) ├──────────────>│Subscription│
//! └──────────────┘             └───────────┘               └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut receiver = bus.subscribe();
//!
//! bus.emit(CoreEvent::Cache(CacheEvent::Invalidated)).ok();
//!
//! let event = receiver.recv().await.unwrap();
//! assert_eq!(event, CoreEvent::Cache(CacheEvent::Invalidated));
//! # }
//! ```
//!
//! ### Callback subscriptions
//!
//! ```no_run
//! use core_runtime::events::{CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::default();
//! let subscription = bus.listen(|event: CoreEvent| {
//!     println!("{}", event.description());
//! });
//!
//! // Later, when the view goes away
//! subscription.unsubscribe();
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell `n` events behind. Non-fatal.
//! - **`RecvError::Closed`**: every sender was dropped; treat as shutdown.
//!
//! `emit` returns an error only when nobody is subscribed. Publishers in this
//! workspace ignore that case.

use bridge_traits::{BackendKind, MediaKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Snapshot
// ============================================================================

/// The merged view of every content resource, keyed by resource name.
///
/// Resources may come from different refresh cycles; the snapshot is a
/// best-effort merge, not a transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheSnapshot {
    entries: BTreeMap<String, Value>,
}

impl CacheSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resource: &str) -> Option<&Value> {
        self.entries.get(resource)
    }

    pub fn contains(&self, resource: &str) -> bool {
        self.entries.contains_key(resource)
    }

    pub fn insert(&mut self, resource: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(resource.into(), value)
    }

    pub fn remove(&mut self, resource: &str) -> Option<Value> {
        self.entries.remove(resource)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl From<BTreeMap<String, Value>> for CacheSnapshot {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Self { entries }
    }
}

impl FromIterator<(String, Value)> for CacheSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Content cache changes
    Cache(CacheEvent),
    /// Media upload outcomes
    Media(MediaEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Cache(e) => e.description(),
            CoreEvent::Media(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Media(MediaEvent::UploadFailed { .. }) => EventSeverity::Error,
            CoreEvent::Cache(CacheEvent::Refreshed { failed, .. }) if !failed.is_empty() => {
                EventSeverity::Warning
            }
            CoreEvent::Media(MediaEvent::Uploaded { .. }) => EventSeverity::Info,
            CoreEvent::Cache(CacheEvent::Invalidated) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Cache Events
// ============================================================================

/// Content cache notifications. One `Refreshed` fires per completed refresh
/// cycle, never one per resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    /// A refresh cycle finished.
    Refreshed {
        /// Monotonic cycle counter
        cycle: u64,
        /// Full snapshot after the cycle was applied
        snapshot: CacheSnapshot,
        /// Resources fetched successfully in this cycle
        refreshed: Vec<String>,
        /// Resources that kept their previous value
        failed: Vec<String>,
    },
    /// A local optimistic write.
    Updated {
        resource: String,
        snapshot: CacheSnapshot,
    },
    /// Memory and persisted copies were cleared.
    Invalidated,
}

impl CacheEvent {
    pub fn description(&self) -> &str {
        match self {
            CacheEvent::Refreshed { .. } => "Content refresh cycle completed",
            CacheEvent::Updated { .. } => "Content resource updated locally",
            CacheEvent::Invalidated => "Content cache invalidated",
        }
    }

    /// Snapshot carried by the event, if any.
    pub fn snapshot(&self) -> Option<&CacheSnapshot> {
        match self {
            CacheEvent::Refreshed { snapshot, .. } | CacheEvent::Updated { snapshot, .. } => {
                Some(snapshot)
            }
            CacheEvent::Invalidated => None,
        }
    }
}

// ============================================================================
// Media Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum MediaEvent {
    /// A file was stored and its record persisted.
    Uploaded {
        media_id: String,
        url: String,
        backend: BackendKind,
        kind: MediaKind,
        size_bytes: u64,
    },
    /// Every backend in the chain failed.
    UploadFailed {
        file_name: String,
        backends_tried: Vec<BackendKind>,
    },
}

impl MediaEvent {
    pub fn description(&self) -> &str {
        match self {
            MediaEvent::Uploaded { .. } => "Media uploaded",
            MediaEvent::UploadFailed { .. } => "Media upload failed on every backend",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to core events.
///
/// Cloning is cheap; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// Subscribers that fall behind by more than `capacity` events receive
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed; dropping the
    /// receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a callback run on a spawned task.
    ///
    /// The returned [`Subscription`] stops delivery when dropped or when
    /// [`Subscription::unsubscribe`] is called. Must be called from within a
    /// tokio runtime.
    pub fn listen<F>(&self, handler: F) -> Subscription
    where
        F: Fn(CoreEvent) + Send + Sync + 'static,
    {
        let mut receiver = self.sender.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => handler(event),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Event listener lagged behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Subscription { task: Some(task) }
    }

    /// Returns the number of active subscribers.
    ///
    /// ```rust
    /// use core_runtime::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.subscriber_count(), 0);
    ///
    /// let _subscriber = event_bus.subscribe();
    /// assert_eq!(event_bus.subscriber_count(), 1);
    /// ```
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Disposer for a callback subscription created by [`EventBus::listen`].
#[must_use = "dropping a Subscription immediately unsubscribes"]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stop delivering events to the callback.
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    /// Whether the listener task is still running.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(100);
/// let cache_only = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Cache(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without waiting.
    ///
    /// Returns `None` if no matching event is currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
