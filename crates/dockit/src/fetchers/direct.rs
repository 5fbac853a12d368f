//! Direct download of raw document files

use crate::client::HttpClient;
use crate::convert::{html_to_markdown, is_html};
use crate::error::FetchError;
use crate::fetchers::Fetcher;
use crate::types::{derive_title, FetchOutcome, FetchedDocument};
use crate::urls::normalize;
use async_trait::async_trait;
use tracing::debug;
use url::Url;

/// Downloads a document file as-is
///
/// HTML served where a document file was expected is converted to markdown.
/// Binary and blank bodies are reported as empty.
pub struct DirectFetcher {
    client: HttpClient,
}

impl DirectFetcher {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for DirectFetcher {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn fetch(&self, url: &Url) -> Result<FetchOutcome, FetchError> {
        let response = self.client.get_text_with_retry(url).await?;

        if response.is_binary() {
            return Ok(FetchOutcome::Empty {
                reason: format!(
                    "binary content ({})",
                    response.content_type.as_deref().unwrap_or("unknown")
                ),
            });
        }

        let content = if is_html(response.content_type.as_deref(), &response.body) {
            debug!(url = %url, "Converting HTML document to markdown");
            html_to_markdown(&response.body)
        } else {
            response.body
        };

        if content.trim().is_empty() {
            return Ok(FetchOutcome::Empty {
                reason: "empty body".to_string(),
            });
        }

        let file_name = url
            .path_segments()
            .and_then(|mut segs| segs.rfind(|s| !s.is_empty()))
            .unwrap_or("index");
        let title = derive_title(&content, file_name);

        Ok(FetchOutcome::Document(FetchedDocument {
            url: normalize(&response.url),
            title,
            content,
            links: Vec::new(),
        }))
    }
}
