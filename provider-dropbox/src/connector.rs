//! Dropbox API connector
//!
//! Implements [`StorageBackend`] for the Dropbox v2 HTTP API.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::{
    BackendKind, MediaKind, StorageBackend, StoreRequest, StoreResult, StoredObject,
};
use core_runtime::config::DropboxCredentials;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{DropboxError, Result};
use crate::types::{
    ApiErrorBody, CreateSharedLinkArg, FileMetadata, ListSharedLinksArg, ListSharedLinksResult,
    SharedLinkMetadata, SharedLinkSettings, UploadArg, WriteMode,
};

/// Content endpoint (uploads)
const CONTENT_API_BASE: &str = "https://content.dropboxapi.com/2";

/// RPC endpoint (sharing)
const RPC_API_BASE: &str = "https://api.dropboxapi.com/2";

/// Largest single-request upload the connector attempts
pub const DROPBOX_MAX_BYTES: u64 = 150 * 1024 * 1024;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const ACCEPTED: &[MediaKind] = &[MediaKind::Image, MediaKind::Video];

/// Dropbox storage backend.
///
/// # Example
///
/// ```ignore
/// use provider_dropbox::DropboxConnector;
///
/// let connector = DropboxConnector::new(http_client, access_token);
/// let stored = connector.store(request).await?;
/// ```
pub struct DropboxConnector {
    http_client: Arc<dyn HttpClient>,
    access_token: String,
    timeout: Duration,
}

impl DropboxConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, access_token: impl Into<String>) -> Self {
        Self {
            http_client,
            access_token: access_token.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_credentials(http_client: Arc<dyn HttpClient>, credentials: &DropboxCredentials) -> Self {
        Self::new(http_client, credentials.access_token.clone())
    }

    /// Per-request timeout handed to the HTTP client.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn rpc_request<T: Serialize>(&self, endpoint: &str, body: &T) -> Result<HttpRequest> {
        Ok(HttpRequest::new(HttpMethod::Post, format!("{}/{}", RPC_API_BASE, endpoint))
            .bearer_token(&self.access_token)
            .timeout(self.timeout)
            .json(body)?)
    }

    /// Turn a non-2xx answer into a typed error.
    fn api_error(response: &HttpResponse) -> DropboxError {
        let message = response
            .json::<ApiErrorBody>()
            .map(|body| body.error_summary)
            .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).to_string());

        if response.status == 401 {
            DropboxError::AuthenticationFailed(message)
        } else {
            DropboxError::ApiError {
                status_code: response.status,
                message,
            }
        }
    }

    #[instrument(skip(self, request), fields(path = %path))]
    async fn upload_file(&self, path: &str, request: &StoreRequest) -> Result<FileMetadata> {
        let arg = UploadArg {
            path: path.to_string(),
            mode: WriteMode::Overwrite,
            autorename: true,
            mute: false,
        };
        let arg = serde_json::to_string(&arg).map_err(|e| DropboxError::ParseError(e.to_string()))?;

        let http_request = HttpRequest::new(
            HttpMethod::Post,
            format!("{}/files/upload", CONTENT_API_BASE),
        )
        .bearer_token(&self.access_token)
        .header("Content-Type", "application/octet-stream")
        .header("Dropbox-API-Arg", arg)
        .timeout(self.timeout)
        .body(request.bytes.clone());

        let response = self.http_client.execute(http_request).await?;
        if !response.is_success() {
            return Err(Self::api_error(&response));
        }

        let metadata: FileMetadata = response
            .json()
            .map_err(|e| DropboxError::ParseError(e.to_string()))?;
        debug!(id = %metadata.id, size = metadata.size, "Uploaded file");
        Ok(metadata)
    }

    /// Create a public viewer link, or reuse the one that already exists.
    #[instrument(skip(self))]
    async fn share(&self, path: &str) -> Result<SharedLinkMetadata> {
        let request = self.rpc_request(
            "sharing/create_shared_link_with_settings",
            &CreateSharedLinkArg {
                path: path.to_string(),
                settings: SharedLinkSettings::public_viewer(),
            },
        )?;
        let response = self.http_client.execute(request).await?;

        if response.is_success() {
            return response
                .json()
                .map_err(|e| DropboxError::ParseError(e.to_string()));
        }

        let already_exists = response.status == 409
            && response
                .json::<ApiErrorBody>()
                .map(|body| body.tag() == Some("shared_link_already_exists"))
                .unwrap_or(false);
        if !already_exists {
            return Err(Self::api_error(&response));
        }

        debug!("Shared link already exists, listing it");
        self.existing_link(path).await
    }

    async fn existing_link(&self, path: &str) -> Result<SharedLinkMetadata> {
        let request = self.rpc_request(
            "sharing/list_shared_links",
            &ListSharedLinksArg {
                path: path.to_string(),
                direct_only: true,
            },
        )?;
        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            return Err(Self::api_error(&response));
        }

        let listed: ListSharedLinksResult = response
            .json()
            .map_err(|e| DropboxError::ParseError(e.to_string()))?;
        listed
            .links
            .into_iter()
            .next()
            .ok_or_else(|| DropboxError::SharedLinkMissing {
                path: path.to_string(),
            })
    }
}

#[async_trait]
impl StorageBackend for DropboxConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::Dropbox
    }

    fn max_bytes(&self) -> u64 {
        DROPBOX_MAX_BYTES
    }

    fn accepted_kinds(&self) -> &'static [MediaKind] {
        ACCEPTED
    }

    #[instrument(skip(self, request), fields(file_name = %request.file_name, size = request.size()))]
    async fn store(&self, request: StoreRequest) -> StoreResult<StoredObject> {
        let path = format!("/{}/{}", request.kind.folder(), request.file_name);
        let size = request.size();

        let uploaded = async {
            let metadata = self.upload_file(&path, &request).await?;
            let link = self.share(&metadata.path_display).await?;
            Ok::<_, DropboxError>((metadata, link))
        }
        .await;

        match uploaded {
            Ok((metadata, link)) => {
                info!(path = %metadata.path_display, "Stored file on Dropbox");
                Ok(StoredObject::new(link.url).with_provider_id(metadata.path_display))
            }
            Err(e) => {
                warn!(error = %e, "Dropbox upload failed");
                Err(e.into_store_error(DROPBOX_MAX_BYTES, size))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bridge_traits::{RetryPolicy, StoreError};
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
            async fn execute_with_retry(
                &self,
                request: HttpRequest,
                policy: RetryPolicy,
            ) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    fn response(status: u16, body: &str) -> bridge_traits::error::Result<HttpResponse> {
        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        })
    }

    fn request() -> StoreRequest {
        StoreRequest::new(
            Bytes::from_static(b"jpeg-bytes"),
            MediaKind::Image,
            "1700000000000-abcdef.jpg",
            "image/jpeg",
        )
    }

    const UPLOADED: &str = r#"{
        "id": "id:a4ayc_80_OEAAAAAAAAAXw",
        "name": "1700000000000-abcdef.jpg",
        "path_display": "/images/1700000000000-abcdef.jpg",
        "size": 10
    }"#;

    #[tokio::test]
    async fn test_store_uploads_then_shares() {
        let mut mock_http = MockHttpClient::new();
        let mut seq = mockall::Sequence::new();

        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| req.url.ends_with("/files/upload"))
            .returning(|req| {
                let arg = req.headers.get("Dropbox-API-Arg").unwrap();
                assert!(arg.contains("/images/1700000000000-abcdef.jpg"));
                assert_eq!(req.headers.get("Authorization").unwrap(), "Bearer sl.token");
                assert_eq!(req.body.as_deref(), Some(&b"jpeg-bytes"[..]));
                response(200, UPLOADED)
            });
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| req.url.ends_with("/sharing/create_shared_link_with_settings"))
            .returning(|_| {
                response(
                    200,
                    r#"{"url": "https://www.dropbox.com/s/abc/1700000000000-abcdef.jpg?dl=0"}"#,
                )
            });

        let connector = DropboxConnector::new(Arc::new(mock_http), "sl.token");
        let stored = connector.store(request()).await.unwrap();

        assert_eq!(
            stored.url,
            "https://www.dropbox.com/s/abc/1700000000000-abcdef.jpg?dl=0"
        );
        assert_eq!(
            stored.provider_id.as_deref(),
            Some("/images/1700000000000-abcdef.jpg")
        );
    }

    #[tokio::test]
    async fn test_existing_link_is_reused() {
        let mut mock_http = MockHttpClient::new();

        mock_http
            .expect_execute()
            .withf(|req| req.url.ends_with("/files/upload"))
            .returning(|_| response(200, UPLOADED));
        mock_http
            .expect_execute()
            .withf(|req| req.url.ends_with("/create_shared_link_with_settings"))
            .returning(|_| {
                response(
                    409,
                    r#"{"error_summary": "shared_link_already_exists/...", "error": {".tag": "shared_link_already_exists"}}"#,
                )
            });
        mock_http
            .expect_execute()
            .times(1)
            .withf(|req| req.url.ends_with("/sharing/list_shared_links"))
            .returning(|req| {
                let body: serde_json::Value =
                    serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
                assert_eq!(body["direct_only"], true);
                response(
                    200,
                    r#"{"links": [{"url": "https://www.dropbox.com/s/old/a.jpg?dl=0"}]}"#,
                )
            });

        let connector = DropboxConnector::new(Arc::new(mock_http), "sl.token");
        let stored = connector.store(request()).await.unwrap();
        assert_eq!(stored.url, "https://www.dropbox.com/s/old/a.jpg?dl=0");
    }

    #[tokio::test]
    async fn test_expired_token_is_permanent() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| response(401, r#"{"error_summary": "expired_access_token/"}"#));

        let connector = DropboxConnector::new(Arc::new(mock_http), "sl.old");
        let err = connector.store(request()).await.unwrap_err();

        assert!(err.is_permanent());
        assert!(err.to_string().contains("expired_access_token"));
    }

    #[tokio::test]
    async fn test_server_error_and_transport_are_transient() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| response(503, "unavailable"));
        let connector = DropboxConnector::new(Arc::new(mock_http), "sl.token");
        assert!(connector.store(request()).await.unwrap_err().is_retryable());

        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Err(BridgeError::Timeout(60_000)));
        let connector = DropboxConnector::new(Arc::new(mock_http), "sl.token");
        assert!(connector.store(request()).await.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_payload_too_large() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| response(413, ""));

        let connector = DropboxConnector::new(Arc::new(mock_http), "sl.token");
        let err = connector.store(request()).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::SizeExceeded {
                limit: DROPBOX_MAX_BYTES,
                actual: 10
            }
        );
    }

    #[test]
    fn test_contract() {
        let connector = DropboxConnector::new(Arc::new(MockHttpClient::new()), "sl.token");
        assert_eq!(connector.kind(), BackendKind::Dropbox);
        assert!(connector.accepts(MediaKind::Video));
    }
}
