use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use spider_client::shapes::request::{ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};
use tracing::debug;

use super::{AcquiredContent, Fetcher, Strategy};
use crate::error::ScrapeError;

// Markdown link targets and bare URLs pointing at documents, in one pass so
// page order is preserved.
static PDF_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\(([^()\s]+\.pdf)\)|\b(https?://[^\s()<>\[\]]+\.pdf)\b").unwrap()
});

/// Crawl-runtime fetch through spider.cloud. The most expensive path and the
/// most robust against anti-bot pages; tried last.
pub struct CrawledFetcher;

#[async_trait]
impl Fetcher for CrawledFetcher {
    fn strategy(&self) -> Strategy {
        Strategy::Crawled
    }

    async fn fetch(&self, url: &str) -> Result<AcquiredContent, ScrapeError> {
        let api_key = std::env::var("SPIDER_API_KEY")
            .map_err(|_| ScrapeError::Crawl("SPIDER_API_KEY environment variable not set".into()))?;
        let spider = Spider::new(Some(api_key))
            .map_err(|e| ScrapeError::Crawl(format!("client init failed: {e}")))?;

        let params = RequestParams {
            return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Markdown)),
            ..Default::default()
        };
        let response = spider
            .scrape_url(url, Some(params), "application/json")
            .await
            .map_err(|e| ScrapeError::Crawl(e.to_string()))?;

        let parsed: serde_json::Value = match response.as_str() {
            Some(s) => serde_json::from_str(s).unwrap_or(response.clone()),
            None => response,
        };
        let content = parsed
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|obj| obj.get("content"))
            .and_then(|c| c.as_str())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ScrapeError::Crawl(format!("empty crawl result for {url}")))?;

        let document_links = document_links(content);
        debug!("crawled fetch of {}: {} chars, {} documents", url, content.len(), document_links.len());
        Ok(AcquiredContent {
            text: content.to_string(),
            document_links,
            source_url: url.to_string(),
        })
    }
}

fn document_links(markdown: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for caps in PDF_LINK_RE.captures_iter(markdown) {
        let Some(m) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let link = m.as_str().to_string();
        if seen.insert(link.clone()) {
            links.push(link);
        }
    }
    links
}

// ── Tests ──
