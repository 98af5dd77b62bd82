//! Cloudinary upload connector

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::{
    BackendKind, Clock, MediaKind, StorageBackend, StoreRequest, StoreResult, StoredObject,
};
use core_runtime::config::CloudinaryCredentials;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{CloudinaryError, Result};
use crate::signing::{sign, SIGNATURE_ALGORITHM};
use crate::types::{ErrorResponse, UploadResponse};

const API_BASE: &str = "https://api.cloudinary.com/v1_1";

pub const CLOUDINARY_MAX_BYTES: u64 = 100 * 1024 * 1024;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const ACCEPTED: &[MediaKind] = &[MediaKind::Image, MediaKind::Video];

pub struct CloudinaryConnector {
    http_client: Arc<dyn HttpClient>,
    credentials: CloudinaryCredentials,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl CloudinaryConnector {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        credentials: CloudinaryCredentials,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http_client,
            credentials,
            clock,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn upload_url(&self, kind: MediaKind) -> String {
        format!(
            "{}/{}/{}/upload",
            API_BASE,
            self.credentials.cloud_name,
            kind.as_str()
        )
    }

    /// Form fields for one upload, signed when a secret is configured.
    fn form_fields(&self, request: &StoreRequest) -> Result<Vec<(&'static str, String)>> {
        let public_id = request
            .file_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&request.file_name)
            .to_string();

        let mut params: BTreeMap<&'static str, String> = BTreeMap::new();
        params.insert("folder", request.kind.folder().to_string());
        params.insert("public_id", public_id);
        if let Some(preset) = &self.credentials.upload_preset {
            params.insert("upload_preset", preset.clone());
        }

        let mut fields = match &self.credentials.api_secret {
            Some(secret) => {
                params.insert("overwrite", "true".to_string());
                params.insert("invalidate", "true".to_string());
                params.insert("timestamp", self.clock.unix_timestamp().to_string());
                let signature = sign(&params, secret);

                let mut fields: Vec<_> = params.into_iter().collect();
                fields.push(("api_key", self.credentials.api_key.clone()));
                fields.push(("signature", signature));
                fields.push(("signature_algorithm", SIGNATURE_ALGORITHM.to_string()));
                fields
            }
            None if self.credentials.upload_preset.is_some() => params.into_iter().collect(),
            None => {
                return Err(CloudinaryError::Credentials(
                    "either an API secret or an upload preset is required".to_string(),
                ))
            }
        };

        fields.push((
            "file",
            format!(
                "data:{};base64,{}",
                request.content_type,
                STANDARD.encode(&request.bytes)
            ),
        ));
        Ok(fields)
    }

    fn api_error(response: &HttpResponse) -> CloudinaryError {
        let message = response
            .json::<ErrorResponse>()
            .map(|body| body.error.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).to_string());
        CloudinaryError::ApiError {
            status_code: response.status,
            message,
        }
    }

    async fn upload(&self, request: &StoreRequest) -> Result<UploadResponse> {
        let fields = self.form_fields(request)?;
        let http_request = HttpRequest::new(HttpMethod::Post, self.upload_url(request.kind))
            .timeout(self.timeout)
            .form(&fields)?;

        let response = self.http_client.execute(http_request).await?;
        if !response.is_success() {
            return Err(Self::api_error(&response));
        }

        response
            .json()
            .map_err(|e| CloudinaryError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl StorageBackend for CloudinaryConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::Cloudinary
    }

    fn max_bytes(&self) -> u64 {
        CLOUDINARY_MAX_BYTES
    }

    fn accepted_kinds(&self) -> &'static [MediaKind] {
        ACCEPTED
    }

    #[instrument(
        skip(self, request),
        fields(cloud = %self.credentials.cloud_name, file_name = %request.file_name, size = request.size())
    )]
    async fn store(&self, request: StoreRequest) -> StoreResult<StoredObject> {
        match self.upload(&request).await {
            Ok(uploaded) => {
                debug!(bytes = uploaded.bytes, resource_type = ?uploaded.resource_type, "Upload accepted");
                info!(public_id = %uploaded.public_id, "Stored file on Cloudinary");

                let mut stored =
                    StoredObject::new(uploaded.secure_url).with_provider_id(uploaded.public_id);
                if let Some(format) = uploaded.format {
                    stored = stored.with_format(format);
                }
                Ok(stored)
            }
            Err(e) => {
                warn!(error = %e, "Cloudinary upload failed");
                Err(e.into_store_error(CLOUDINARY_MAX_BYTES, request.size()))
            }
        }
    }
}
