//! Fetchers retrieve one unit of content per URL
//!
//! Design: the crawler only knows the [`Fetcher`] trait. Which fetcher runs
//! is decided once per ingestion from the [`FetchMode`] of the source:
//! - [`DirectFetcher`] downloads raw document files
//! - [`PageFetcher`] renders a web page through a [`Renderer`], extracts its
//!   main content and collects outbound links

#[cfg(feature = "browser")]
mod browser;
mod direct;
mod page;

#[cfg(feature = "browser")]
pub use browser::BrowserRenderer;
pub use direct::DirectFetcher;
pub use page::{HttpRenderer, PageFetcher, RenderedPage, Renderer};

use crate::client::HttpClient;
use crate::error::{FetchError, IngestError};
use crate::types::{FetchMode, FetchOutcome};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;
use url::Url;

/// Trait for content fetchers
///
/// Implementations retry transient failures internally and return a
/// terminal error only once their retry policy is exhausted.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Unique identifier for this fetcher (for logging/debugging)
    fn name(&self) -> &'static str;

    /// Fetch one unit of content
    async fn fetch(&self, url: &Url) -> Result<FetchOutcome, FetchError>;
}

/// Which page renderer backs web-page scraping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RendererKind {
    /// Plain HTTP GET, no script execution
    #[default]
    Http,
    /// Headless Chromium, scripts executed
    Browser,
}

impl RendererKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" => Some(RendererKind::Http),
            "browser" | "chrome" | "chromium" => Some(RendererKind::Browser),
            _ => None,
        }
    }
}

/// Build the renderer for web-page scraping
pub async fn build_renderer(
    kind: RendererKind,
    client: &HttpClient,
) -> Result<Arc<dyn Renderer>, IngestError> {
    match kind {
        RendererKind::Http => {
            note_http_rendering();
            Ok(Arc::new(HttpRenderer::new(client.clone())))
        }
        #[cfg(feature = "browser")]
        RendererKind::Browser => {
            let renderer = BrowserRenderer::launch()
                .await
                .map_err(|e| IngestError::Configuration(e.to_string()))?;
            Ok(Arc::new(renderer))
        }
        #[cfg(not(feature = "browser"))]
        RendererKind::Browser => Err(IngestError::Configuration(
            "browser rendering requested but dockit was built without the `browser` feature"
                .to_string(),
        )),
    }
}

static HTTP_RENDER_NOTED: AtomicBool = AtomicBool::new(false);

/// Warn once per process that pages are scraped without running scripts.
///
/// Returns true for the call that logged.
fn note_http_rendering() -> bool {
    if HTTP_RENDER_NOTED.swap(true, Ordering::Relaxed) {
        return false;
    }
    warn!(
        "Scraping web pages with the http renderer: client-side scripts do not run, so \
         script-built pages may be dropped as empty. Build with the `browser` feature and \
         set DOCKIT_RENDERER=browser to render them."
    );
    true
}

/// Fetcher for a manifest's links in the given mode
pub fn fetcher_for_mode(
    mode: FetchMode,
    client: &HttpClient,
    renderer: Arc<dyn Renderer>,
) -> Arc<dyn Fetcher> {
    match mode {
        FetchMode::DirectDownload => Arc::new(DirectFetcher::new(client.clone())),
        FetchMode::WebPage => Arc::new(PageFetcher::new(renderer, client.retry_policy())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FetchOptions;

    #[test]
    fn test_renderer_kind_parse() {
        assert_eq!(RendererKind::parse("http"), Some(RendererKind::Http));
        assert_eq!(RendererKind::parse(" Browser "), Some(RendererKind::Browser));
        assert_eq!(RendererKind::parse("lynx"), None);
    }

    #[test]
    fn test_fetcher_for_mode() {
        let client = HttpClient::new(FetchOptions::default()).unwrap();
        let renderer: Arc<dyn Renderer> = Arc::new(HttpRenderer::new(client.clone()));
        assert_eq!(
            fetcher_for_mode(FetchMode::DirectDownload, &client, renderer.clone()).name(),
            "direct"
        );
        assert_eq!(
            fetcher_for_mode(FetchMode::WebPage, &client, renderer).name(),
            "page"
        );
    }

    #[tokio::test]
    async fn test_http_renderer_warning_logged_once() {
        let client = HttpClient::new(FetchOptions::default()).unwrap();
        let renderer = build_renderer(RendererKind::Http, &client).await.unwrap();
        assert_eq!(renderer.name(), "http");
        assert!(!note_http_rendering());
        assert!(!note_http_rendering());
    }

    #[cfg(not(feature = "browser"))]
    #[tokio::test]
    async fn test_browser_renderer_requires_feature() {
        let client = HttpClient::new(FetchOptions::default()).unwrap();
        let result = build_renderer(RendererKind::Browser, &client).await;
        assert!(matches!(result, Err(IngestError::Configuration(_))));
    }
}
