//! Web-page scraping: render, extract main content, collect links

use crate::client::HttpClient;
use crate::error::FetchError;
use crate::extract::{extract_page, rejection_reason};
use crate::fetchers::Fetcher;
use crate::retry::RetryPolicy;
use crate::types::{FetchOutcome, FetchedDocument};
use crate::urls::normalize;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Markup of a rendered page
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// URL after redirects
    pub url: Url,
    pub html: String,
}

/// Produces the final HTML of a page
#[async_trait]
pub trait Renderer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Render once; retries are handled by the caller
    async fn render(&self, url: &Url) -> Result<RenderedPage, FetchError>;
}

/// Renders by plain HTTP GET; client-side scripts do not run
pub struct HttpRenderer {
    client: HttpClient,
}

impl HttpRenderer {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn render(&self, url: &Url) -> Result<RenderedPage, FetchError> {
        let response = self.client.get_text(url).await?;
        Ok(RenderedPage {
            url: response.url,
            html: response.body,
        })
    }
}

/// Scrapes one web page into a markdown document
pub struct PageFetcher {
    renderer: Arc<dyn Renderer>,
    retry: RetryPolicy,
    scope: Option<String>,
}

impl PageFetcher {
    pub fn new(renderer: Arc<dyn Renderer>, retry: RetryPolicy) -> Self {
        Self {
            renderer,
            retry,
            scope: None,
        }
    }

    /// Only report outbound links starting with `scope`
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

#[async_trait]
impl Fetcher for PageFetcher {
    fn name(&self) -> &'static str {
        "page"
    }

    async fn fetch(&self, url: &Url) -> Result<FetchOutcome, FetchError> {
        let page = self
            .retry
            .run(url.as_str(), || self.renderer.render(url))
            .await?;

        let extracted = extract_page(&page.html, &page.url, self.scope.as_deref());
        if let Some(reason) = rejection_reason(&extracted.title, &extracted.markdown) {
            debug!(url = %url, renderer = self.renderer.name(), %reason, "Skipping page");
            return Ok(FetchOutcome::Empty { reason });
        }

        let final_url = normalize(&page.url);
        let content = format!(
            "# {}\n\nSource: {}\n\n{}",
            extracted.title, final_url, extracted.markdown
        );

        Ok(FetchOutcome::Document(FetchedDocument {
            url: final_url,
            title: extracted.title,
            content,
            links: extracted.links,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Serves canned HTML, failing the first `flaky` renders of each URL
    struct StaticRenderer {
        pages: HashMap<String, String>,
        flaky: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Renderer for StaticRenderer {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn render(&self, url: &Url) -> Result<RenderedPage, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.flaky {
                return Err(FetchError::Timeout);
            }
            match self.pages.get(url.as_str()) {
                Some(html) => Ok(RenderedPage {
                    url: url.clone(),
                    html: html.clone(),
                }),
                None => Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    fn renderer(pages: &[(&str, &str)], flaky: usize) -> Arc<StaticRenderer> {
        Arc::new(StaticRenderer {
            pages: pages
                .iter()
                .map(|(u, h)| (u.to_string(), h.to_string()))
                .collect(),
            flaky,
            calls: AtomicUsize::new(0),
        })
    }

    const GOOD: &str = r#"<html><head><title>Quickstart</title></head><body>
        <main><p>This quickstart walks through installing and configuring the tool.</p>
        <a href="/docs/next">Next</a><a href="/blog/post">Blog</a></main></body></html>"#;

    const SOFT_404: &str = r#"<html><head><title>404 Page Not Found</title></head><body>
        <main><p>We looked everywhere but this page does not exist anymore, sorry about that.</p></main>
        </body></html>"#;

    #[tokio::test]
    async fn test_scrapes_document_with_scoped_links() {
        let r = renderer(&[("https://example.com/docs/start", GOOD)], 0);
        let fetcher = PageFetcher::new(r, RetryPolicy::none()).with_scope("https://example.com/docs");
        let url = Url::parse("https://example.com/docs/start").unwrap();

        let FetchOutcome::Document(doc) = fetcher.fetch(&url).await.unwrap() else {
            panic!("expected a document");
        };
        assert_eq!(doc.title, "Quickstart");
        assert!(doc
            .content
            .starts_with("# Quickstart\n\nSource: https://example.com/docs/start\n\n"));
        assert_eq!(doc.links, vec!["https://example.com/docs/next".to_string()]);
    }

    #[tokio::test]
    async fn test_soft_404_is_empty() {
        let r = renderer(&[("https://example.com/gone", SOFT_404)], 0);
        let fetcher = PageFetcher::new(r, RetryPolicy::none());
        let url = Url::parse("https://example.com/gone").unwrap();
        assert!(matches!(
            fetcher.fetch(&url).await.unwrap(),
            FetchOutcome::Empty { .. }
        ));
    }

    #[tokio::test]
    async fn test_transient_render_failures_retried() {
        let r = renderer(&[("https://example.com/docs/start", GOOD)], 2);
        let fetcher = PageFetcher::new(r.clone(), RetryPolicy::new(2, Duration::ZERO));
        let url = Url::parse("https://example.com/docs/start").unwrap();
        assert!(matches!(
            fetcher.fetch(&url).await.unwrap(),
            FetchOutcome::Document(_)
        ));
        assert_eq!(r.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_missing_page_fails_without_retry() {
        let r = renderer(&[], 0);
        let fetcher = PageFetcher::new(r.clone(), RetryPolicy::new(2, Duration::ZERO));
        let url = Url::parse("https://example.com/missing").unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(r.calls.load(Ordering::SeqCst), 1);
    }
}
