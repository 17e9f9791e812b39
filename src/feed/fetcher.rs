use crate::config::{Config, HeaderStrategy};
use futures::StreamExt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while fetching a feed.
///
/// Non-2xx statuses are not errors at this layer: they come back as a
/// [`FetchResult`] so the checker can decide how to classify them.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, invalid header, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Response body exceeded the configured size limit
    #[error("Response too large (limit {limit} bytes)")]
    ResponseTooLarge { limit: usize },
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Raw outcome of one HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub status: u16,
    /// `Content-Type` header, if the server sent one
    pub content_type: Option<String>,
    /// Response body; left empty for non-2xx responses
    pub body: Vec<u8>,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_forbidden(&self) -> bool {
        self.status == 403
    }
}

/// Capability to fetch a URL with one header strategy.
pub trait Fetch {
    fn fetch(
        &self,
        url: &str,
        strategy: &HeaderStrategy,
    ) -> impl Future<Output = Result<FetchResult, FetchError>>;
}

/// [`Fetch`] implementation backed by a shared `reqwest::Client`.
///
/// Redirects are followed by the client. Each request is bounded by the
/// timeout and the body by the size limit passed at construction.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            timeout,
            max_bytes,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        Self::new(config.timeout(), config.max_feed_bytes)
    }

    fn map_send_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Network(err)
        }
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str, strategy: &HeaderStrategy) -> Result<FetchResult, FetchError> {
        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, strategy.user_agent.as_str());
        for (name, value) in &strategy.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))?
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);

        tracing::debug!(
            url = %url,
            strategy = %strategy.name,
            status = status.as_u16(),
            content_type = ?content_type,
            "Fetched feed"
        );

        if !status.is_success() {
            return Ok(FetchResult {
                status: status.as_u16(),
                content_type,
                body: Vec::new(),
            });
        }

        let body = read_limited_bytes(response, self.max_bytes)
            .await
            .map_err(|e| match e {
                FetchError::Network(inner) => self.map_send_error(inner),
                other => other,
            })?;

        Ok(FetchResult {
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge { limit });
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge { limit });
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
