//! Error types for DocKit

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while fetching a single unit of content
#[derive(Debug, Error)]
pub enum FetchError {
    /// URL could not be parsed or is not http(s)
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to build HTTP client
    #[error("Failed to create HTTP client")]
    ClientBuildError(#[source] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// Failed to connect to server
    #[error("Failed to connect to server")]
    ConnectError(#[source] reqwest::Error),

    /// Other request error
    #[error("Request failed: {0}")]
    RequestError(String),

    /// Page rendering failed (headless browser)
    #[error("Render failed: {0}")]
    RenderError(String),
}

impl FetchError {
    /// Create an error from a reqwest error
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::ConnectError(err)
        } else if let Some(status) = err.status() {
            FetchError::Status {
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
                status: status.as_u16(),
            }
        } else {
            FetchError::RequestError(err.to_string())
        }
    }

    /// HTTP status code, when the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether another attempt may succeed.
    ///
    /// Network failures, timeouts, 429 and 5xx are transient. Other 4xx
    /// responses and malformed input are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Timeout
            | FetchError::ConnectError(_)
            | FetchError::RequestError(_)
            | FetchError::RenderError(_) => true,
            FetchError::InvalidUrl(_) | FetchError::ClientBuildError(_) => false,
        }
    }
}

/// A derived local path would escape the cache root
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },
}

impl PathError {
    pub(crate) fn invalid(path: impl Into<String>, reason: &'static str) -> Self {
        PathError::InvalidPath {
            path: path.into(),
            reason,
        }
    }
}

/// Failures talking to the external summarization / chat service
#[derive(Debug, Error)]
pub enum SummarizationError {
    /// No API key configured
    #[error("OPENAI_API_KEY not configured")]
    MissingApiKey,

    /// Service answered with an error status
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Network level failure
    #[error("Request failed: {0}")]
    Network(String),

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Per-item deadline exceeded
    #[error("Timed out after {0} seconds")]
    Timeout(u64),
}

/// Errors from the persisted project registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown documentation source: {0}")]
    UnknownProject(String),

    #[error("Failed to persist registry to {path}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize registry")]
    Serialize(#[from] serde_json::Error),

    #[error("Refusing to delete {0}: not inside the cache root")]
    OutsideCacheRoot(PathBuf),

    #[error("Failed to remove cache directory {path}")]
    RemoveDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Whole-run failures that abort an ingestion
#[derive(Debug, Error)]
pub enum IngestError {
    /// Required external credentials or settings are missing
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Caller supplied an unusable argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The manifest or source document could not be retrieved at all
    #[error("Could not fetch {url}: {source}")]
    SourceUnavailable {
        url: String,
        #[source]
        source: FetchError,
    },

    /// Nothing usable was retrieved
    #[error("No documents retrieved from {0}")]
    NoDocuments(String),

    /// Cache directory could not be prepared or written
    #[error("Cache error at {path}: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl IngestError {
    pub(crate) fn cache(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngestError::Cache {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let status = |status| FetchError::Status {
            url: "https://example.com".to_string(),
            status,
        };
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(FetchError::Timeout.is_retryable());
        assert!(!FetchError::InvalidUrl("ftp://x".to_string()).is_retryable());
        assert_eq!(status(404).status(), Some(404));
        assert_eq!(FetchError::Timeout.status(), None);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            FetchError::Status {
                url: "https://example.com/a.md".to_string(),
                status: 404
            }
            .to_string(),
            "HTTP 404 for https://example.com/a.md"
        );
        assert_eq!(
            PathError::invalid("../etc/passwd", "parent directory segment").to_string(),
            "Invalid path '../etc/passwd': parent directory segment"
        );
        assert_eq!(
            SummarizationError::MissingApiKey.to_string(),
            "OPENAI_API_KEY not configured"
        );
        assert_eq!(
            IngestError::Configuration("OPENAI_API_KEY is not set".to_string()).to_string(),
            "Configuration error: OPENAI_API_KEY is not set"
        );
    }
}
