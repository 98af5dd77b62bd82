//! ImgBB upload connector

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_traits::{
    BackendKind, MediaKind, StorageBackend, StoreRequest, StoreResult, StoredObject,
};
use core_runtime::config::ImgBbCredentials;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{ImgBbError, Result};
use crate::types::{UploadResponse, UploadedImage};

const UPLOAD_URL: &str = "https://api.imgbb.com/1/upload";

pub const IMGBB_MAX_BYTES: u64 = 32 * 1024 * 1024;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const ACCEPTED: &[MediaKind] = &[MediaKind::Image];

pub struct ImgBbConnector {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    timeout: Duration,
}

impl ImgBbConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_credentials(http_client: Arc<dyn HttpClient>, credentials: &ImgBbCredentials) -> Self {
        Self::new(http_client, credentials.api_key.clone())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn upload(&self, request: &StoreRequest) -> Result<UploadedImage> {
        let fields = [
            ("key", self.api_key.clone()),
            ("image", STANDARD.encode(&request.bytes)),
            ("name", request.file_name.clone()),
        ];
        let http_request = HttpRequest::new(HttpMethod::Post, UPLOAD_URL)
            .timeout(self.timeout)
            .form(&fields)?;

        let response = self.http_client.execute(http_request).await?;
        let parsed = response.json::<UploadResponse>();

        if !response.is_success() {
            let message = parsed
                .ok()
                .and_then(|body| body.error)
                .map(|error| error.message)
                .unwrap_or_else(|| String::from_utf8_lossy(&response.body).to_string());
            return Err(ImgBbError::ApiError {
                status_code: response.status,
                message,
            });
        }

        let body = parsed.map_err(|e| ImgBbError::ParseError(e.to_string()))?;
        match body.data {
            Some(image) if body.success => Ok(image),
            _ => Err(ImgBbError::Rejected(
                body.error
                    .map(|error| error.message)
                    .unwrap_or_else(|| "upload was not accepted".to_string()),
            )),
        }
    }
}

#[async_trait]
impl StorageBackend for ImgBbConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::ImgBb
    }

    fn max_bytes(&self) -> u64 {
        IMGBB_MAX_BYTES
    }

    fn accepted_kinds(&self) -> &'static [MediaKind] {
        ACCEPTED
    }

    #[instrument(skip(self, request), fields(file_name = %request.file_name, size = request.size()))]
    async fn store(&self, request: StoreRequest) -> StoreResult<StoredObject> {
        match self.upload(&request).await {
            Ok(image) => {
                debug!(
                    display_url = %image.display_url,
                    delete_url = image.delete_url.as_deref().unwrap_or(""),
                    "Upload accepted"
                );
                info!(id = %image.id, "Stored image on ImgBB");

                let mut stored = StoredObject::new(image.url).with_provider_id(image.id);
                if let Some(extension) = image.image.and_then(|file| file.extension) {
                    stored = stored.with_format(extension);
                }
                Ok(stored)
            }
            Err(e) => {
                warn!(error = %e, "ImgBB upload failed");
                Err(e.into_store_error(IMGBB_MAX_BYTES, request.size()))
            }
        }
    }
}
