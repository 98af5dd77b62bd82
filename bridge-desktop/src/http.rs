//! `reqwest` implementation of [`HttpClient`].

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy},
};
use reqwest::{redirect, Client};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("storefront-core/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Share links bounce through a couple of hosts before the file itself.
const MAX_REDIRECTS: usize = 5;

pub struct ReqwestHttpClient {
    client: Client,
    default_timeout: Duration,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Falls back to a stock `reqwest::Client` when the tuned builder fails.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::try_with_timeout(timeout).unwrap_or_else(|e| {
            warn!(error = %e, "Using stock HTTP client");
            Self {
                client: Client::new(),
                default_timeout: timeout,
            }
        })
    }

    pub fn try_with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            default_timeout: timeout,
        })
    }

    fn method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    fn prepare(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(Self::method(request.method), &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }

    fn transport_error(&self, request: &HttpRequest, e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            let deadline = request.timeout.unwrap_or(self.default_timeout);
            BridgeError::Timeout(deadline.as_millis() as u64)
        } else if e.is_connect() {
            BridgeError::Transport(format!("connect to {}: {}", request.url, e))
        } else if e.is_builder() {
            BridgeError::OperationFailed(format!("invalid request to {}: {}", request.url, e))
        } else {
            BridgeError::Transport(e.to_string())
        }
    }

    async fn collect(response: reqwest::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| BridgeError::Transport(format!("read body: {}", e)))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute_with_retry(request, RetryPolicy::no_retry())
            .await
    }

    /// Retries transport failures and retryable statuses. A `Retry-After`
    /// header, when present, replaces the computed backoff (still capped by
    /// the policy). The final response is returned whatever its status.
    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let max_attempts = policy.max_attempts.max(1);

        for attempt in 0..max_attempts {
            let last = attempt + 1 == max_attempts;
            debug!(
                method = request.method.as_str(),
                url = %request.url,
                attempt = attempt + 1,
                "Sending request"
            );

            let mut delay = policy.delay_for(attempt);
            match self.prepare(&request).send().await {
                Ok(raw) => {
                    let response = Self::collect(raw).await?;
                    if last || !response.is_retryable() {
                        return Ok(response);
                    }
                    warn!(status = response.status, attempt = attempt + 1, "Retryable status");
                    if let Some(hint) = response.retry_after() {
                        delay = hint.min(policy.max_delay);
                    }
                }
                Err(e) if last => return Err(self.transport_error(&request, e)),
                Err(e) => warn!(error = %e, attempt = attempt + 1, "Request failed"),
            }

            sleep(delay).await;
        }

        Err(BridgeError::OperationFailed(format!(
            "no attempt made for {}",
            request.url
        )))
    }
}
