//! Shared HTTP client used by the fetchers
//!
//! One [`HttpClient`] is built per ingestion and shared by every worker, so
//! connections are pooled across the crawl.

use crate::error::FetchError;
use crate::retry::RetryPolicy;
use crate::DEFAULT_USER_AGENT;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Binary content type prefixes
const BINARY_PREFIXES: &[&str] = &[
    "image/",
    "audio/",
    "video/",
    "application/octet-stream",
    "application/pdf",
    "application/zip",
    "application/gzip",
    "application/x-tar",
    "application/vnd.ms-",
    "application/vnd.openxmlformats",
    "font/",
];

/// Options for the shared HTTP client
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Custom User-Agent
    pub user_agent: Option<String>,
    /// Time allowed to establish a connection
    pub connect_timeout: Duration,
    /// Time allowed for the whole request including the body
    pub timeout: Duration,
    /// Retry policy for transient failures
    pub retry: RetryPolicy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            user_agent: None,
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Text body of a successful response
#[derive(Debug, Clone)]
pub struct TextResponse {
    /// Final URL after redirects
    pub url: Url,
    pub content_type: Option<String>,
    pub body: String,
}

impl TextResponse {
    /// Whether the content type names a binary format
    pub fn is_binary(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(is_binary_content_type)
    }
}

/// Pooled HTTP client with timeouts and a retry policy
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    options: FetchOptions,
}

impl HttpClient {
    pub fn new(options: FetchOptions) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        let user_agent = options.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_USER_AGENT)),
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/markdown, text/plain, text/html, */*;q=0.8"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(options.connect_timeout)
            .timeout(options.timeout)
            .build()
            .map_err(FetchError::ClientBuildError)?;

        Ok(Self { client, options })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.options.retry
    }

    /// Single GET attempt; non-2xx statuses become [`FetchError::Status`]
    pub async fn get_text(&self, url: &Url) -> Result<TextResponse, FetchError> {
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = read_body_with_timeout(response, self.options.timeout).await?;

        Ok(TextResponse {
            url: final_url,
            content_type,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    /// GET with the configured retry policy
    pub async fn get_text_with_retry(&self, url: &Url) -> Result<TextResponse, FetchError> {
        self.options
            .retry
            .run(url.as_str(), || self.get_text(url))
            .await
    }
}

/// Check if content type indicates binary content
pub fn is_binary_content_type(content_type: &str) -> bool {
    let ct_lower = content_type.to_lowercase();
    BINARY_PREFIXES
        .iter()
        .any(|prefix| ct_lower.starts_with(prefix))
}

/// Read the full response body, failing if the deadline passes first.
///
/// A truncated document would be cached as if complete, so a partial body
/// is reported as a timeout instead of returned.
async fn read_body_with_timeout(
    response: reqwest::Response,
    timeout: Duration,
) -> Result<Bytes, FetchError> {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        tokio::select! {
            chunk = stream.next() => {
                match chunk {
                    Some(Ok(bytes)) => body.extend_from_slice(&bytes),
                    Some(Err(e)) => return Err(FetchError::from_reqwest(e)),
                    None => return Ok(Bytes::from(body)),
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                warn!(received = body.len(), "Body timeout reached");
                return Err(FetchError::Timeout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_binary_content_type() {
        assert!(is_binary_content_type("image/png"));
        assert!(is_binary_content_type("application/pdf"));
        assert!(is_binary_content_type("application/octet-stream"));
        assert!(is_binary_content_type("font/woff2"));
        assert!(is_binary_content_type(
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        ));

        assert!(!is_binary_content_type("text/html"));
        assert!(!is_binary_content_type("text/markdown; charset=utf-8"));
        assert!(!is_binary_content_type("application/json"));
    }

    #[test]
    fn test_default_options() {
        let options = FetchOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert_eq!(options.retry.max_retries, 2);
        assert!(HttpClient::new(options).is_ok());
    }
}
