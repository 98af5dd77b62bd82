//! Fire-and-forget access tracking.
//!
//! Read paths call [`AccessTracker::track`] and move on. The increment runs on
//! a spawned task and every failure is logged and dropped, so tracking can
//! never slow down or break the read that triggered it.

use crate::models::MediaId;
use crate::repository::MediaRepository;
use bridge_traits::MediaKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Payload of the access-tracking boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub url: String,
    pub kind: Option<MediaKind>,
}

impl AccessEvent {
    pub fn new(url: impl Into<String>, kind: Option<MediaKind>) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }
}

#[derive(Clone)]
pub struct AccessTracker {
    repository: Arc<dyn MediaRepository>,
}

enum Target {
    Url(String),
    Id(MediaId),
}

impl AccessTracker {
    pub fn new(repository: Arc<dyn MediaRepository>) -> Self {
        Self { repository }
    }

    /// Record a hit on the record whose direct URL matches.
    ///
    /// The handle is only useful to tests; callers are expected to drop it.
    pub fn track(&self, event: AccessEvent) -> Option<JoinHandle<()>> {
        debug!(url = %event.url, kind = ?event.kind, "Tracking media access");
        self.spawn(Target::Url(event.url))
    }

    /// Record a hit by record id.
    pub fn track_id(&self, id: MediaId) -> Option<JoinHandle<()>> {
        self.spawn(Target::Id(id))
    }

    fn spawn(&self, target: Target) -> Option<JoinHandle<()>> {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No async runtime, media access not tracked");
                return None;
            }
        };

        let repository = Arc::clone(&self.repository);
        Some(handle.spawn(async move {
            let (label, outcome) = match &target {
                Target::Url(url) => (url.as_str(), repository.touch_by_url(url).await),
                Target::Id(id) => (id.as_str(), repository.touch(id).await),
            };
            match outcome {
                Ok(true) => {}
                Ok(false) => debug!(media = label, "Access for unknown media ignored"),
                Err(e) => warn!(media = label, error = %e, "Failed to track media access"),
            }
        }))
    }
}
