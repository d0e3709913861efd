pub mod crawled;
pub mod plain;
pub mod rendered;

use async_trait::async_trait;

use crate::error::ScrapeError;

pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Fetch mechanisms in ascending order of cost. Plain requests are cheap,
/// headless rendering pays a browser launch, and a crawl-runtime job is the
/// last resort for pages that defeat both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Plain,
    Rendered,
    Crawled,
}

impl Strategy {
    pub const COST_ORDER: [Strategy; 3] = [Strategy::Plain, Strategy::Rendered, Strategy::Crawled];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Plain => "plain",
            Strategy::Rendered => "rendered",
            Strategy::Crawled => "crawled",
        }
    }

    pub fn parse(s: &str) -> Option<Strategy> {
        match s {
            "plain" => Some(Strategy::Plain),
            "rendered" => Some(Strategy::Rendered),
            "crawled" => Some(Strategy::Crawled),
            _ => None,
        }
    }
}

/// What one fetch produces: rendered page text plus any linked documents,
/// in page order. Lives only for the duration of a single acquisition.
#[derive(Debug, Clone, Default)]
pub struct AcquiredContent {
    pub text: String,
    pub document_links: Vec<String>,
    pub source_url: String,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    fn strategy(&self) -> Strategy;

    async fn fetch(&self, url: &str) -> Result<AcquiredContent, ScrapeError>;
}
