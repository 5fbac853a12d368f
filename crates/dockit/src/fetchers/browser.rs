//! Headless Chromium renderer (feature `browser`)

use crate::error::FetchError;
use crate::fetchers::{RenderedPage, Renderer};
use crate::DEFAULT_USER_AGENT;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};
use url::Url;

/// Time given to client-side scripts after navigation completes
const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Renders pages in a shared headless Chromium, one tab per request
pub struct BrowserRenderer {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserRenderer {
    /// Launch Chromium and drive its CDP event loop in the background
    pub async fn launch() -> Result<Self, FetchError> {
        let config = BrowserConfig::builder()
            .request_timeout(Duration::from_secs(30))
            .window_size(1920, 1080)
            .arg(format!("--user-agent={}", DEFAULT_USER_AGENT))
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--no-first-run")
            .arg("--mute-audio")
            .build()
            .map_err(FetchError::RenderError)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::RenderError(format!("Failed to launch browser: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("Browser handler error: {:?}", e);
                }
            }
            info!("Browser event handler task completed");
        });

        info!("Launched headless browser");
        Ok(Self { browser, handler })
    }
}

impl Drop for BrowserRenderer {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl Renderer for BrowserRenderer {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn render(&self, url: &Url) -> Result<RenderedPage, FetchError> {
        let render_err = |e: chromiumoxide::error::CdpError| FetchError::RenderError(e.to_string());

        let page = self.browser.new_page(url.as_str()).await.map_err(render_err)?;
        let result = async {
            page.wait_for_navigation().await.map_err(render_err)?;
            tokio::time::sleep(SETTLE_DELAY).await;
            let html = page.content().await.map_err(render_err)?;
            let final_url = page
                .url()
                .await
                .map_err(render_err)?
                .and_then(|u| Url::parse(&u).ok())
                .unwrap_or_else(|| url.clone());
            Ok::<_, FetchError>(RenderedPage {
                url: final_url,
                html,
            })
        }
        .await;

        if let Err(e) = page.close().await {
            error!(url = %url, "Failed to close browser tab: {}", e);
        }
        result
    }
}
