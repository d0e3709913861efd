use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ScrapeError;

const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    pub link: String,
}

/// Ordered web-search results for a query. May legitimately come back empty;
/// transport problems are reported, never panicked on.
#[async_trait]
pub trait SearchOracle: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ScrapeError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchHit>,
}

/// Google Programmable Search client.
pub struct GoogleSearch {
    client: reqwest::Client,
    api_key: String,
    cse_id: String,
}

impl GoogleSearch {
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY").ok().filter(|s| !s.is_empty())?;
        let cse_id = std::env::var("GOOGLE_CSE_ID").ok().filter(|s| !s.is_empty())?;
        Some(Self {
            client: reqwest::Client::new(),
            api_key,
            cse_id,
        })
    }
}

#[async_trait]
impl SearchOracle for GoogleSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ScrapeError> {
        let url = format!(
            "https://www.googleapis.com/customsearch/v1?q={}&key={}&cx={}",
            urlencoding::encode(query),
            self.api_key,
            self.cse_id
        );
        let resp = self
            .client
            .get(&url)
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| ScrapeError::Resolution(format!("search request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(ScrapeError::Resolution(format!(
                "search returned status {}",
                resp.status()
            )));
        }
        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| ScrapeError::Resolution(format!("bad search response: {e}")))?;
        Ok(body.items)
    }
}

/// Stand-in oracle for deployments without search credentials; resolution
/// then falls straight back to the bare domain.
pub struct NullSearch;

#[async_trait]
impl SearchOracle for NullSearch {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, ScrapeError> {
        Ok(Vec::new())
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parsing_keeps_result_order() {
        let raw = r#"{
            "kind": "customsearch#search",
            "items": [
                {"title": "Notice Board", "link": "https://example.edu/notices"},
                {"title": "Home", "link": "https://example.edu/"}
            ]
        }"#;
        let parsed: SearchResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(parsed.items[0].link, "https://example.edu/notices");
    }

    #[test]
    fn missing_items_means_no_results() {
        let parsed: SearchResponse = serde_json::from_str(r#"{"kind": "x"}"#).unwrap();
        assert!(parsed.items.is_empty());
    }
}
