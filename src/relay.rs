//! HTTP transport to the push relay.

use reqwest::header::{HeaderValue, CONNECTION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::time::Duration;
use url::Url;

/// One POST to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    pub url: Url,
    pub title: String,
    /// Base64 envelope
    pub body: String,
}

/// Every variant is retryable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP {0}")]
    Status(u16),
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connection(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

pub trait Transport: Send + Sync + 'static {
    /// Returns `Ok` only when the relay answered `200 OK`.
    fn post(
        &self,
        request: &RelayRequest,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Build `endpoint_base/topic`, percent-encoding the topic as a path segment.
pub fn relay_url(endpoint_base: &str, topic: &str) -> Result<Url, String> {
    let mut url = Url::parse(endpoint_base).map_err(|e| e.to_string())?;
    url.path_segments_mut()
        .map_err(|_| "endpoint cannot be a base URL".to_string())?
        .pop_if_empty()
        .push(topic);
    Ok(url)
}

pub struct ReqwestTransport {
    client: Client,
    user_agent: String,
}

impl ReqwestTransport {
    /// `timeout` bounds both connecting and the whole request.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()?;
        Ok(Self::with_client(client, user_agent))
    }

    pub fn with_client(client: Client, user_agent: &str) -> Self {
        Self {
            client,
            user_agent: user_agent.to_string(),
        }
    }
}

impl Transport for ReqwestTransport {
    async fn post(&self, request: &RelayRequest) -> Result<(), TransportError> {
        let title = HeaderValue::from_bytes(request.title.as_bytes())
            .map_err(|e| TransportError::Request(format!("invalid title header: {e}")))?;

        log::debug!("POST {} ({} bytes)", request.url, request.body.len());

        let response = self
            .client
            .post(request.url.clone())
            .header(CONTENT_TYPE, "text/plain")
            .header(USER_AGENT, self.user_agent.as_str())
            .header("Title", title)
            .header(CONNECTION, "close")
            .body(request.body.clone())
            .send()
            .await?;

        let status = response.status();
        // Drain the body so the connection is not left half-read
        if let Err(e) = response.bytes().await {
            log::debug!("Failed to read relay response body: {e}");
        }

        if status == StatusCode::OK {
            Ok(())
        } else {
            Err(TransportError::Status(status.as_u16()))
        }
    }
}
