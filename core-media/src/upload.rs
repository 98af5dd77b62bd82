//! # Upload Orchestrator
//!
//! Walks the backend chain until one provider stores the file, then records
//! the result.
//!
//! ## Flow
//!
//! 1. Pre-process once (declared images are bounded and re-encoded).
//! 2. Build the chain: the preferred backend first, then the configured order.
//! 3. For each backend: run the local `check`, then `store` under a deadline.
//!    Transient failures are retried on the same backend per the retry policy;
//!    every other failure falls through to the next backend.
//! 4. Normalize the returned URL, let the URL override the declared kind when
//!    it names a known extension, optionally probe reachability.
//! 5. Persist one [`MediaRecord`] with a zero access count and announce it.
//!
//! If the whole chain fails the caller gets [`MediaError::UploadExhausted`]
//! listing one entry per backend in chain order.

use crate::classify::detect;
use crate::error::{BackendAttempt, MediaError, Result, UploadFailure};
use crate::links::normalize;
use crate::models::{MediaId, MediaRecord, UploadReceipt};
use crate::probe::LinkProbe;
use crate::processing::{prepare, unique_name, ImageLimits, PreparedMedia};
use crate::repository::MediaRepository;
use bridge_traits::{
    BackendKind, Clock, MediaKind, StorageBackend, StoreError, StoreRequest, StoredObject,
};
use bytes::Bytes;
use core_runtime::config::UploadPolicy;
use core_runtime::events::{CoreEvent, EventBus, MediaEvent};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// One file handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bytes: Bytes,
    /// Caller-supplied hint; the stored URL may override it
    pub declared_kind: MediaKind,
    pub file_name: String,
    pub preferred_backend: Option<BackendKind>,
}

impl UploadRequest {
    pub fn new(bytes: impl Into<Bytes>, declared_kind: MediaKind, file_name: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            declared_kind,
            file_name: file_name.into(),
            preferred_backend: None,
        }
    }

    pub fn prefer(mut self, backend: BackendKind) -> Self {
        self.preferred_backend = Some(backend);
        self
    }
}

/// A successful upload and the backends that failed before it.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub record: MediaRecord,
    pub fallbacks: Vec<BackendAttempt>,
}

impl UploadOutcome {
    pub fn receipt(&self) -> UploadReceipt {
        UploadReceipt::from(&self.record)
    }
}

pub struct UploadOrchestrator {
    backends: Vec<Arc<dyn StorageBackend>>,
    repository: Arc<dyn MediaRepository>,
    clock: Arc<dyn Clock>,
    policy: UploadPolicy,
    events: Option<EventBus>,
    probe: Option<Arc<dyn LinkProbe>>,
}

impl UploadOrchestrator {
    pub fn new(
        backends: Vec<Arc<dyn StorageBackend>>,
        repository: Arc<dyn MediaRepository>,
        clock: Arc<dyn Clock>,
        policy: UploadPolicy,
    ) -> Self {
        Self {
            backends,
            repository,
            clock,
            policy,
            events: None,
            probe: None,
        }
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Verify every normalized URL before recording it.
    pub fn with_probe(mut self, probe: Arc<dyn LinkProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Backend kinds in the order an upload would try them.
    pub fn chain_for(&self, preferred: Option<BackendKind>) -> Vec<BackendKind> {
        self.chain(preferred).iter().map(|b| b.kind()).collect()
    }

    fn find(&self, kind: BackendKind) -> Option<&Arc<dyn StorageBackend>> {
        self.backends.iter().find(|b| b.kind() == kind)
    }

    /// Preferred backend first, then the configured order. Registered
    /// backends missing from the order are only used when preferred.
    fn chain(&self, preferred: Option<BackendKind>) -> Vec<&Arc<dyn StorageBackend>> {
        let mut seen = HashSet::new();
        preferred
            .into_iter()
            .chain(self.policy.backend_order.iter().copied())
            .filter(|kind| seen.insert(*kind))
            .filter_map(|kind| self.find(kind))
            .collect()
    }

    #[instrument(
        skip(self, request),
        fields(
            file_name = %request.file_name,
            declared_kind = %request.declared_kind,
            size = request.bytes.len()
        )
    )]
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadOutcome> {
        if request.bytes.is_empty() {
            return Err(MediaError::invalid("bytes", "file is empty"));
        }
        if request.file_name.trim().is_empty() {
            return Err(MediaError::invalid("file_name", "file name is required"));
        }

        let chain = self.chain(request.preferred_backend);
        if chain.is_empty() {
            return Err(MediaError::NoBackends);
        }

        let prepared = self.prepare(&request).await?;
        let stored_name = unique_name(self.clock.as_ref(), &prepared.extension);
        let store_request = StoreRequest::new(
            prepared.bytes.clone(),
            prepared.kind,
            stored_name,
            prepared.content_type.clone(),
        );

        let mut failure = UploadFailure::default();
        for backend in chain {
            match self.store_with_retry(backend.as_ref(), &store_request).await {
                Ok(stored) => {
                    let record = self
                        .record(&request, &prepared, backend.kind(), stored)
                        .await?;
                    return Ok(UploadOutcome {
                        record,
                        fallbacks: failure.backends_tried,
                    });
                }
                Err(e) => {
                    if e.is_permanent() {
                        error!(backend = %backend.kind(), error = %e, "Backend rejected upload");
                    } else {
                        warn!(backend = %backend.kind(), error = %e, "Backend failed, falling through");
                    }
                    failure.push(backend.kind(), e);
                }
            }
        }

        error!(failure = %failure, "Upload failed on every backend");
        self.emit(MediaEvent::UploadFailed {
            file_name: request.file_name.clone(),
            backends_tried: failure.backends(),
        });
        Err(MediaError::UploadExhausted(failure))
    }

    async fn prepare(&self, request: &UploadRequest) -> Result<PreparedMedia> {
        let limits = ImageLimits {
            max_edge: self.policy.max_image_edge,
            jpeg_quality: self.policy.jpeg_quality,
        };
        let bytes = request.bytes.clone();
        let kind = request.declared_kind;
        let file_name = request.file_name.clone();

        tokio::task::spawn_blocking(move || prepare(bytes, kind, &file_name, limits))
            .await
            .map_err(|e| MediaError::ImageProcessing(format!("pre-processing task failed: {}", e)))
    }

    async fn store_with_retry(
        &self,
        backend: &dyn StorageBackend,
        request: &StoreRequest,
    ) -> std::result::Result<StoredObject, StoreError> {
        backend.check(request)?;

        let retry = &self.policy.retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let result = tokio::time::timeout(self.policy.store_timeout, backend.store(request.clone()))
                .await
                .unwrap_or_else(|_| {
                    Err(StoreError::TransientNetwork(format!(
                        "no response within {} ms",
                        self.policy.store_timeout.as_millis()
                    )))
                });

            match result {
                Ok(stored) => return Ok(stored),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = retry.delay_for(attempt);
                    debug!(
                        backend = %backend.kind(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn record(
        &self,
        request: &UploadRequest,
        prepared: &PreparedMedia,
        backend: BackendKind,
        stored: StoredObject,
    ) -> Result<MediaRecord> {
        let direct_url = normalize(&stored.url);
        let kind = detect(&direct_url).unwrap_or(prepared.kind);
        if kind != request.declared_kind {
            debug!(declared = %request.declared_kind, detected = %kind, "URL overrides declared kind");
        }

        let link_verified = match &self.probe {
            Some(probe) if is_absolute(&direct_url) => {
                let reachable = probe.is_reachable(&direct_url).await;
                if !reachable {
                    warn!(url = %direct_url, "Stored link did not answer the reachability probe");
                }
                Some(reachable)
            }
            _ => None,
        };

        let record = MediaRecord {
            id: MediaId::new(),
            direct_url,
            kind,
            backend,
            size_bytes: prepared.bytes.len() as u64,
            original_name: request.file_name.clone(),
            format: stored.format.unwrap_or_else(|| prepared.extension.clone()),
            provider_id: stored.provider_id,
            link_verified,
            access_count: 0,
            last_accessed_at: None,
            created_at: self.clock.unix_timestamp_millis(),
        };
        self.repository.insert(&record).await?;

        info!(
            media_id = %record.id,
            backend = %backend,
            kind = %record.kind,
            url = %record.direct_url,
            "Media uploaded"
        );
        self.emit(MediaEvent::Uploaded {
            media_id: record.id.to_string(),
            url: record.direct_url.clone(),
            backend,
            kind: record.kind,
            size_bytes: record.size_bytes,
        });

        Ok(record)
    }

    fn emit(&self, event: MediaEvent) {
        if let Some(events) = &self.events {
            // No subscribers is fine
            let _ = events.emit(CoreEvent::Media(event));
        }
    }
}

fn is_absolute(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::repository::SqliteMediaRepository;
    use async_trait::async_trait;
    use bridge_traits::{RetryPolicy, StoreResult, SystemClock};
    use mockall::mock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const BOTH: &[MediaKind] = &[MediaKind::Image, MediaKind::Video];
    const IMAGES: &[MediaKind] = &[MediaKind::Image];

    mock! {
        Backend {}

        #[async_trait]
        impl StorageBackend for Backend {
            fn kind(&self) -> BackendKind;
            fn max_bytes(&self) -> u64;
            fn accepted_kinds(&self) -> &'static [MediaKind];
            async fn store(&self, request: StoreRequest) -> StoreResult<StoredObject>;
        }
    }

    mock! {
        Probe {}

        #[async_trait]
        impl LinkProbe for Probe {
            async fn is_reachable(&self, url: &str) -> bool;
        }
    }

    fn backend(kind: BackendKind, max_bytes: u64, kinds: &'static [MediaKind]) -> MockBackend {
        let mut mock = MockBackend::new();
        mock.expect_kind().return_const(kind);
        mock.expect_max_bytes().return_const(max_bytes);
        mock.expect_accepted_kinds().return_const(kinds);
        mock
    }

    fn policy(order: Vec<BackendKind>) -> UploadPolicy {
        UploadPolicy::default()
            .with_backend_order(order)
            .with_store_timeout(Duration::from_secs(5))
            .with_retry(RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                use_exponential_backoff: true,
            })
    }

    async fn orchestrator(backends: Vec<MockBackend>, order: Vec<BackendKind>) -> (UploadOrchestrator, Arc<SqliteMediaRepository>) {
        let pool = create_test_pool().await.unwrap();
        let repo = Arc::new(SqliteMediaRepository::new(pool, Arc::new(SystemClock)));
        let backends = backends
            .into_iter()
            .map(|b| Arc::new(b) as Arc<dyn StorageBackend>)
            .collect();
        let orchestrator =
            UploadOrchestrator::new(backends, repo.clone(), Arc::new(SystemClock), policy(order));
        (orchestrator, repo)
    }

    fn video(len: usize) -> UploadRequest {
        UploadRequest::new(vec![7u8; len], MediaKind::Video, "Harvest Day.MOV")
    }

    #[tokio::test]
    async fn test_size_exceeded_falls_through_to_next_backend() {
        let mut small = backend(BackendKind::Cloudinary, 10, BOTH);
        small.expect_store().never();
        let mut roomy = backend(BackendKind::Dropbox, 1_000, BOTH);
        roomy.expect_store().times(1).returning(|req| {
            Ok(StoredObject::new(format!(
                "https://www.dropbox.com/s/abc/{}?dl=0",
                req.file_name
            )))
        });

        let (orchestrator, repo) = orchestrator(
            vec![small, roomy],
            vec![BackendKind::Cloudinary, BackendKind::Dropbox],
        )
        .await;

        let outcome = orchestrator.upload(video(100)).await.unwrap();

        assert_eq!(outcome.record.backend, BackendKind::Dropbox);
        assert_eq!(outcome.record.kind, MediaKind::Video);
        assert_eq!(outcome.record.access_count, 0);
        assert!(outcome
            .record
            .direct_url
            .starts_with("https://dl.dropboxusercontent.com/s/abc/"));
        assert!(outcome.record.direct_url.ends_with(".mov"));

        assert_eq!(outcome.fallbacks.len(), 1);
        assert_eq!(outcome.fallbacks[0].backend, BackendKind::Cloudinary);
        assert_eq!(
            outcome.fallbacks[0].error,
            StoreError::SizeExceeded {
                limit: 10,
                actual: 100
            }
        );

        let saved = repo.find_by_id(&outcome.record.id).await.unwrap().unwrap();
        assert_eq!(saved, outcome.record);
    }

    #[tokio::test]
    async fn test_exhausted_chain_lists_each_backend_once_in_order() {
        let mut imgbb = backend(BackendKind::ImgBb, 1_000, IMAGES);
        imgbb.expect_store().never();
        let mut dropbox = backend(BackendKind::Dropbox, 1_000, BOTH);
        dropbox
            .expect_store()
            .times(2)
            .returning(|_| Err(StoreError::TransientNetwork("reset".to_string())));
        let mut cloudinary = backend(BackendKind::Cloudinary, 1_000, BOTH);
        cloudinary
            .expect_store()
            .times(1)
            .returning(|_| Err(StoreError::PermanentProvider("bad api key".to_string())));

        let (orchestrator, repo) = orchestrator(
            vec![cloudinary, dropbox, imgbb],
            vec![BackendKind::ImgBb, BackendKind::Dropbox, BackendKind::Cloudinary],
        )
        .await;

        let err = orchestrator.upload(video(100)).await.unwrap_err();
        let failure = match err {
            MediaError::UploadExhausted(failure) => failure,
            other => panic!("expected exhausted chain, got {other:?}"),
        };

        assert_eq!(
            failure.backends(),
            vec![BackendKind::ImgBb, BackendKind::Dropbox, BackendKind::Cloudinary]
        );
        assert!(matches!(failure.backends_tried[0].error, StoreError::UnsupportedKind { .. }));
        assert!(failure.backends_tried[1].error.is_retryable());
        assert!(failure.backends_tried[2].error.is_permanent());
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_on_same_backend() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut flaky = backend(BackendKind::Cloudinary, 1_000, BOTH);
        flaky.expect_store().times(2).returning(move |req| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StoreError::TransientNetwork("503".to_string()))
            } else {
                Ok(StoredObject::new(format!(
                    "https://res.cloudinary.com/demo/video/upload/{}",
                    req.file_name
                ))
                .with_format("mov"))
            }
        });

        let (orchestrator, _) = orchestrator(vec![flaky], vec![BackendKind::Cloudinary]).await;
        let outcome = orchestrator.upload(video(10)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(outcome.fallbacks.is_empty());
        assert_eq!(outcome.record.format, "mov");
    }

    #[tokio::test]
    async fn test_preferred_backend_goes_first() {
        let mut local = backend(BackendKind::LocalFilesystem, 1_000, BOTH);
        local
            .expect_store()
            .times(1)
            .returning(|req| Ok(StoredObject::new(format!("/uploads/videos/{}", req.file_name))));
        let mut dropbox = backend(BackendKind::Dropbox, 1_000, BOTH);
        dropbox.expect_store().never();

        let (orchestrator, _) = orchestrator(
            vec![dropbox, local],
            vec![BackendKind::Dropbox, BackendKind::LocalFilesystem],
        )
        .await;

        assert_eq!(
            orchestrator.chain_for(Some(BackendKind::LocalFilesystem)),
            vec![BackendKind::LocalFilesystem, BackendKind::Dropbox]
        );

        let outcome = orchestrator
            .upload(video(10).prefer(BackendKind::LocalFilesystem))
            .await
            .unwrap();
        assert_eq!(outcome.record.backend, BackendKind::LocalFilesystem);
        assert!(outcome.record.direct_url.starts_with("/uploads/videos/"));
    }

    #[tokio::test]
    async fn test_url_kind_overrides_declared_kind() {
        let mut local = backend(BackendKind::LocalFilesystem, 1_000, BOTH);
        local
            .expect_store()
            .returning(|_| Ok(StoredObject::new("/uploads/images/mislabelled.mp4")));

        let (orchestrator, _) =
            orchestrator(vec![local], vec![BackendKind::LocalFilesystem]).await;
        let request = UploadRequest::new(vec![1u8, 2, 3], MediaKind::Image, "clip.mp4");

        let outcome = orchestrator.upload(request).await.unwrap();
        assert_eq!(outcome.record.kind, MediaKind::Video);
    }

    #[tokio::test]
    async fn test_opaque_url_keeps_declared_kind() {
        let mut blob = backend(BackendKind::DatabaseBlob, 1_000, BOTH);
        blob.expect_store()
            .returning(|_| Ok(StoredObject::new("/api/media/42").with_provider_id("42")));

        let (orchestrator, _) = orchestrator(vec![blob], vec![BackendKind::DatabaseBlob]).await;
        let outcome = orchestrator.upload(video(10)).await.unwrap();

        assert_eq!(outcome.record.kind, MediaKind::Video);
        assert_eq!(outcome.record.provider_id.as_deref(), Some("42"));
    }

    struct SlowBackend;

    #[async_trait]
    impl StorageBackend for SlowBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Dropbox
        }
        fn max_bytes(&self) -> u64 {
            u64::MAX
        }
        fn accepted_kinds(&self) -> &'static [MediaKind] {
            BOTH
        }
        async fn store(&self, _request: StoreRequest) -> StoreResult<StoredObject> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(StoredObject::new("https://never.example.com/x.mp4"))
        }
    }

    #[tokio::test]
    async fn test_stuck_backend_times_out_and_falls_through() {
        let pool = create_test_pool().await.unwrap();
        let repo = Arc::new(SqliteMediaRepository::new(pool, Arc::new(SystemClock)));

        let mut local = backend(BackendKind::LocalFilesystem, 1_000, BOTH);
        local
            .expect_store()
            .returning(|req| Ok(StoredObject::new(format!("/uploads/videos/{}", req.file_name))));

        let orchestrator = UploadOrchestrator::new(
            vec![Arc::new(SlowBackend), Arc::new(local)],
            repo,
            Arc::new(SystemClock),
            policy(vec![BackendKind::Dropbox, BackendKind::LocalFilesystem])
                .with_store_timeout(Duration::from_millis(50)),
        );

        let outcome = orchestrator.upload(video(10)).await.unwrap();
        assert_eq!(outcome.record.backend, BackendKind::LocalFilesystem);
        assert_eq!(outcome.fallbacks[0].backend, BackendKind::Dropbox);
        assert!(outcome.fallbacks[0].error.is_retryable());
    }

    #[tokio::test]
    async fn test_probe_result_is_recorded_and_events_fire() {
        let mut cdn = backend(BackendKind::Cloudinary, 1_000, BOTH);
        cdn.expect_store()
            .returning(|_| Ok(StoredObject::new("https://res.cloudinary.com/demo/video/upload/a.mp4")));
        let mut probe = MockProbe::new();
        probe.expect_is_reachable().times(1).return_const(true);

        let (orchestrator, _) = orchestrator(vec![cdn], vec![BackendKind::Cloudinary]).await;
        let bus = EventBus::new(8);
        let mut events = bus.subscribe();
        let orchestrator = orchestrator.with_event_bus(bus).with_probe(Arc::new(probe));

        let outcome = orchestrator.upload(video(10)).await.unwrap();
        assert_eq!(outcome.record.link_verified, Some(true));
        assert_eq!(
            outcome.receipt().url,
            "https://res.cloudinary.com/demo/video/upload/a.mp4?raw=1"
        );

        match events.recv().await.unwrap() {
            CoreEvent::Media(MediaEvent::Uploaded { media_id, backend, .. }) => {
                assert_eq!(media_id, outcome.record.id.to_string());
                assert_eq!(backend, BackendKind::Cloudinary);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejects_empty_input_and_empty_chain() {
        let (orchestrator, _) = orchestrator(Vec::new(), vec![BackendKind::Dropbox]).await;

        assert!(matches!(
            orchestrator
                .upload(UploadRequest::new(Vec::<u8>::new(), MediaKind::Image, "a.jpg"))
                .await,
            Err(MediaError::InvalidInput { .. })
        ));
        assert!(matches!(
            orchestrator.upload(video(10)).await,
            Err(MediaError::NoBackends)
        ));
    }
}
