use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tracing::debug;

use super::{AcquiredContent, Fetcher, Strategy};
use crate::error::ScrapeError;

const RENDER_TIMEOUT: Duration = Duration::from_secs(20);

/// Headless-browser fetch for pages that only produce content after script
/// execution. Each call launches its own browser instance and tears it down
/// on every exit path, timeouts included.
pub struct RenderedFetcher;

impl RenderedFetcher {
    fn browser_config() -> Result<BrowserConfig, ScrapeError> {
        let mut builder = BrowserConfig::builder()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage");
        if let Ok(path) = std::env::var("NOTIFIND_CHROME") {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(ScrapeError::Render)
    }
}

#[async_trait]
impl Fetcher for RenderedFetcher {
    fn strategy(&self) -> Strategy {
        Strategy::Rendered
    }

    async fn fetch(&self, url: &str) -> Result<AcquiredContent, ScrapeError> {
        let config = Self::browser_config()?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScrapeError::Render(format!("browser launch failed: {e}")))?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let outcome = tokio::time::timeout(RENDER_TIMEOUT, render(&browser, url)).await;

        // Teardown runs no matter how the render ended.
        let _ = browser.close().await;
        events.abort();

        match outcome {
            Ok(result) => result,
            Err(_) => Err(ScrapeError::Render(format!(
                "navigation timed out after {}s for {}",
                RENDER_TIMEOUT.as_secs(),
                url
            ))),
        }
    }
}

async fn render(browser: &Browser, url: &str) -> Result<AcquiredContent, ScrapeError> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| ScrapeError::Render(format!("page creation failed: {e}")))?;
    page.goto(url)
        .await
        .map_err(|e| ScrapeError::Render(format!("navigation failed: {e}")))?;
    let _ = page.wait_for_navigation().await;

    let text: String = page
        .evaluate("document.body ? document.body.innerText : ''")
        .await
        .map_err(|e| ScrapeError::Render(format!("text capture failed: {e}")))?
        .into_value()
        .map_err(|e| ScrapeError::Render(format!("text decode failed: {e:?}")))?;

    let hrefs: Vec<String> = page
        .evaluate("Array.from(document.querySelectorAll('a[href]')).map(a => a.getAttribute('href'))")
        .await
        .map_err(|e| ScrapeError::Render(format!("link capture failed: {e}")))?
        .into_value()
        .map_err(|e| ScrapeError::Render(format!("link decode failed: {e:?}")))?;

    let mut seen = HashSet::new();
    let document_links: Vec<String> = hrefs
        .into_iter()
        .filter(|h| h.to_ascii_lowercase().ends_with(".pdf"))
        .filter(|h| seen.insert(h.clone()))
        .collect();

    debug!("rendered fetch of {}: {} chars, {} documents", url, text.len(), document_links.len());
    Ok(AcquiredContent {
        text,
        document_links,
        source_url: url.to_string(),
    })
}
