//! Reachability checks for normalized links.
//!
//! Normalization is heuristic, so a rewritten link can be wrong. A probe sends
//! a `HEAD` request with a short deadline and remembers recent verdicts.
//! Only answers carrying an HTTP status are remembered; a timeout or transport
//! failure is reported as unreachable and asked again next time.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_CACHE_CAPACITY: usize = 256;

#[async_trait]
pub trait LinkProbe: Send + Sync {
    /// `true` when the URL answers with a success status in time.
    async fn is_reachable(&self, url: &str) -> bool;
}

/// `HEAD` probe over the host HTTP client.
pub struct HttpLinkProbe {
    client: Arc<dyn HttpClient>,
    timeout: Duration,
    verdicts: Mutex<LruCache<String, bool>>,
}

impl HttpLinkProbe {
    pub fn new(client: Arc<dyn HttpClient>, timeout: Duration) -> Self {
        Self::with_capacity(client, timeout, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(client: Arc<dyn HttpClient>, timeout: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            client,
            timeout,
            verdicts: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Drop every remembered verdict.
    pub fn forget_all(&self) {
        self.verdicts.lock().clear();
    }
}

#[async_trait]
impl LinkProbe for HttpLinkProbe {
    #[instrument(skip(self))]
    async fn is_reachable(&self, url: &str) -> bool {
        let cached = self.verdicts.lock().get(url).copied();
        if let Some(verdict) = cached {
            debug!(verdict, "Link probe answered from cache");
            return verdict;
        }

        let request = HttpRequest::new(HttpMethod::Head, url).timeout(self.timeout);
        match self.client.execute(request).await {
            Ok(response) => {
                let verdict = response.is_success();
                self.verdicts.lock().put(url.to_string(), verdict);
                verdict
            }
            Err(e) => {
                debug!(error = %e, "Link probe failed");
                false
            }
        }
    }
}
