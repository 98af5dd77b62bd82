//! Resource fetching.
//!
//! Every poll fetches the full current value of a resource; there is no
//! pagination or partial-update protocol.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use core_runtime::config::{ContentCacheConfig, ContentResource};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::{ContentError, Result};

/// Source of a resource's current value.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, resource: &ContentResource) -> Result<Value>;
}

/// Fetches resources over HTTP from the storefront's read endpoints.
pub struct HttpResourceFetcher {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    timeout: Duration,
}

impl HttpResourceFetcher {
    pub fn new(http_client: Arc<dyn HttpClient>, config: &ContentCacheConfig) -> Self {
        Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.fetch_timeout,
        }
    }

    fn url_for(&self, resource: &ContentResource) -> String {
        format!("{}/{}", self.base_url, resource.path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ResourceFetcher for HttpResourceFetcher {
    #[instrument(skip(self, resource), fields(resource = %resource.name))]
    async fn fetch(&self, resource: &ContentResource) -> Result<Value> {
        let request = HttpRequest::new(HttpMethod::Get, self.url_for(resource))
            .header("Accept", "application/json")
            .header("Cache-Control", "no-store")
            .timeout(self.timeout);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| ContentError::fetch(&resource.name, e.to_string()))?;

        if !response.is_success() {
            return Err(ContentError::fetch(
                &resource.name,
                format!("HTTP {}", response.status),
            ));
        }

        let value: Value = serde_json::from_slice(&response.body)
            .map_err(|e| ContentError::decode(&resource.name, e.to_string()))?;
        debug!(bytes = response.body.len(), "Fetched resource");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::{HttpResponse, RetryPolicy};
    use bytes::Bytes;
    use mockall::mock;
    use serde_json::json;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
            async fn execute_with_retry(
                &self,
                request: HttpRequest,
                policy: RetryPolicy,
            ) -> BridgeResult<HttpResponse>;
        }
    }

    fn config() -> ContentCacheConfig {
        ContentCacheConfig::new("https://shop.example.com/").with_fetch_timeout(Duration::from_secs(3))
    }

    fn reply(status: u16, body: &'static str) -> BridgeResult<HttpResponse> {
        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from_static(body.as_bytes()),
        })
    }

    #[tokio::test]
    async fn test_fetch_bypasses_http_caches() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.url, "https://shop.example.com/api/social-links");
            assert_eq!(req.headers.get("Cache-Control").unwrap(), "no-store");
            assert_eq!(req.timeout, Some(Duration::from_secs(3)));
            reply(200, r#"[{"platform": "instagram", "url": "https://instagram.com/farm"}]"#)
        });

        let fetcher = HttpResourceFetcher::new(Arc::new(mock_http), &config());
        let value = fetcher
            .fetch(&ContentResource::new("socialLinks", "/api/social-links"))
            .await
            .unwrap();

        assert_eq!(
            value,
            json!([{"platform": "instagram", "url": "https://instagram.com/farm"}])
        );
    }

    #[tokio::test]
    async fn test_error_status_is_fetch_failure() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .returning(|_| reply(500, "Internal Server Error"));

        let fetcher = HttpResourceFetcher::new(Arc::new(mock_http), &config());
        let err = fetcher
            .fetch(&ContentResource::new("products", "/api/products"))
            .await
            .unwrap_err();

        assert!(matches!(err, ContentError::FetchFailed { ref resource, .. } if resource == "products"));
    }

    #[tokio::test]
    async fn test_bad_json_is_decode_failure() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .returning(|_| reply(200, "<html>maintenance</html>"));

        let fetcher = HttpResourceFetcher::new(Arc::new(mock_http), &config());
        let err = fetcher
            .fetch(&ContentResource::new("farms", "/api/farms"))
            .await
            .unwrap_err();

        assert!(matches!(err, ContentError::DecodeFailed { .. }));
    }

    #[tokio::test]
    async fn test_transport_error_is_fetch_failure() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .returning(|_| Err(BridgeError::Timeout(3_000)));

        let fetcher = HttpResourceFetcher::new(Arc::new(mock_http), &config());
        let err = fetcher
            .fetch(&ContentResource::new("settings", "/api/settings"))
            .await
            .unwrap_err();

        assert!(matches!(err, ContentError::FetchFailed { .. }));
    }
}
