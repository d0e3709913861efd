use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;

use super::{AcquiredContent, Fetcher, Strategy, USER_AGENT};
use crate::error::ScrapeError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Single-request fetch: one GET, parsed HTML, no script execution.
pub struct PlainFetcher {
    client: reqwest::Client,
}

impl PlainFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for PlainFetcher {
    fn strategy(&self) -> Strategy {
        Strategy::Plain
    }

    async fn fetch(&self, url: &str) -> Result<AcquiredContent, ScrapeError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ScrapeError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ScrapeError::Transport(format!(
                "status {} for {}",
                resp.status(),
                url
            )));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| ScrapeError::Transport(e.to_string()))?;

        let (text, document_links) = parse_page(&body);
        debug!("plain fetch of {}: {} chars, {} documents", url, text.len(), document_links.len());
        Ok(AcquiredContent {
            text,
            document_links,
            source_url: url.to_string(),
        })
    }
}

/// Visible text (whitespace-normalized, one line per text node) and document
/// links in page order. `Html` is !Send, so parsing stays out of the async fn.
fn parse_page(html: &str) -> (String, Vec<String>) {
    let doc = Html::parse_document(html);
    (visible_text(&doc), document_links(&doc))
}

fn visible_text(doc: &Html) -> String {
    let mut parts: Vec<String> = Vec::new();
    for node in doc.tree.nodes() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| matches!(e.name(), "script" | "style" | "noscript"))
                .unwrap_or(false)
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed.split_whitespace().collect::<Vec<_>>().join(" "));
        }
    }
    parts.join("\n")
}

fn document_links(doc: &Html) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for el in doc.select(&ANCHOR_SEL) {
        if let Some(href) = el.value().attr("href") {
            if href.to_ascii_lowercase().ends_with(".pdf") && seen.insert(href.to_string()) {
                links.push(href.to_string());
            }
        }
    }
    links
}

// ── Tests ──
