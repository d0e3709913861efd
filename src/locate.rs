use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::error::ScrapeError;
use crate::fetch::AcquiredContent;

/// Characters of context kept on each side of a page-text match.
pub const SNIPPET_WINDOW: usize = 300;

/// Wall-clock ceiling for the document-scanning phase of one locate call.
pub const DEFAULT_SCAN_BUDGET: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub enum LocateResult {
    /// The phrase appeared in the page text; offsets are character indices.
    Snippet {
        content: String,
        window_start: usize,
        window_end: usize,
    },
    /// The phrase appeared inside a linked document.
    Document { url: String },
    NotFound,
}

#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<String, ScrapeError>;
}

/// Search acquired content for a phrase: page text first, then each linked
/// document in page order until one matches or the budget runs out.
///
/// The budget is checked before each document's extraction starts, never
/// mid-extraction, so an exhausted budget overruns by at most the one
/// extraction already in flight. Unscanned documents are abandoned;
/// bounded latency is deliberately bought with completeness.
pub async fn locate(
    acquired: &AcquiredContent,
    phrase: &str,
    extractor: &dyn DocumentExtractor,
    budget: Duration,
) -> LocateResult {
    if let Some((start, end)) = find_ci(&acquired.text, phrase) {
        debug!("phrase found in page text at char {}", start);
        return snippet(&acquired.text, start, end);
    }

    let scan_start = Instant::now();
    for (i, link) in acquired.document_links.iter().enumerate() {
        if scan_start.elapsed() >= budget {
            warn!(
                "document scan budget exhausted, {} of {} documents unscanned",
                acquired.document_links.len() - i,
                acquired.document_links.len()
            );
            return LocateResult::NotFound;
        }

        let document_url = resolve_document_url(&acquired.source_url, link);
        match extractor.extract(&document_url).await {
            Ok(text) if find_ci(&text, phrase).is_some() => {
                debug!("phrase found inside {}", document_url);
                return LocateResult::Document { url: document_url };
            }
            Ok(_) => debug!("no match in {}", document_url),
            Err(e) => debug!("skipping unsearchable document {}: {}", document_url, e),
        }
    }

    LocateResult::NotFound
}

/// First case-insensitive occurrence, as (start, end) character offsets.
fn find_ci(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    fn fold(c: char) -> char {
        c.to_lowercase().next().unwrap_or(c)
    }
    let h: Vec<char> = haystack.chars().map(fold).collect();
    let n: Vec<char> = needle.chars().map(fold).collect();
    if n.is_empty() || n.len() > h.len() {
        return None;
    }
    h.windows(n.len())
        .position(|w| w == &n[..])
        .map(|i| (i, i + n.len()))
}

fn snippet(text: &str, start: usize, end: usize) -> LocateResult {
    let len = text.chars().count();
    let window_start = start.saturating_sub(SNIPPET_WINDOW);
    let window_end = (end + SNIPPET_WINDOW).min(len);
    let content: String = text
        .chars()
        .skip(window_start)
        .take(window_end - window_start)
        .collect();
    LocateResult::Snippet {
        content,
        window_start,
        window_end,
    }
}

/// Relative document links are resolved against the source page's host.
fn resolve_document_url(source_url: &str, link: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        return link.to_string();
    }
    let host = Url::parse(source_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    format!("https://{}/{}", host, link.trim_start_matches('/'))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    struct MapExtractor {
        docs: Vec<(&'static str, Result<&'static str, ()>)>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DocumentExtractor for MapExtractor {
        async fn extract(&self, url: &str) -> Result<String, ScrapeError> {
            self.calls.lock().unwrap().push(url.to_string());
            self.docs
                .iter()
                .find(|(u, _)| *u == url)
                .map(|(_, r)| {
                    r.map(str::to_string)
                        .map_err(|_| ScrapeError::Extraction("unreadable".into()))
                })
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    struct SlowExtractor {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentExtractor for SlowExtractor {
        async fn extract(&self, _url: &str) -> Result<String, ScrapeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok("nothing relevant".to_string())
        }
    }

    struct PanicExtractor;

    #[async_trait]
    impl DocumentExtractor for PanicExtractor {
        async fn extract(&self, _url: &str) -> Result<String, ScrapeError> {
            panic!("no extraction may start once the budget is spent");
        }
    }

    fn content(text: &str, links: &[&str]) -> AcquiredContent {
        AcquiredContent {
            text: text.to_string(),
            document_links: links.iter().map(|s| s.to_string()).collect(),
            source_url: "https://example.edu/notices".to_string(),
        }
    }

    #[tokio::test]
    async fn snippet_window_is_clamped_to_text_bounds() {
        let acquired = content("xxAdmit Cardyy", &[]);
        let result = locate(&acquired, "admit card", &PanicExtractor, DEFAULT_SCAN_BUDGET).await;
        assert_eq!(
            result,
            LocateResult::Snippet {
                content: "xxAdmit Cardyy".to_string(),
                window_start: 0,
                window_end: 14,
            }
        );
    }

    #[tokio::test]
    async fn snippet_window_is_exactly_300_chars_each_side() {
        let text = format!("{}Admit Card 2025{}", "a".repeat(400), "b".repeat(400));
        let acquired = content(&text, &[]);
        let result = locate(&acquired, "Admit Card 2025", &PanicExtractor, DEFAULT_SCAN_BUDGET).await;
        match result {
            LocateResult::Snippet {
                content,
                window_start,
                window_end,
            } => {
                assert_eq!(window_start, 100);
                assert_eq!(window_end, 715);
                assert_eq!(content.chars().count(), 615);
                assert!(content.starts_with(&"a".repeat(300)));
                assert!(content.ends_with(&"b".repeat(300)));
                assert!(content.contains("Admit Card 2025"));
            }
            other => panic!("expected a snippet, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_occurrence_wins() {
        let text = format!("{}target{}target", "x".repeat(10), "y".repeat(800));
        let acquired = content(&text, &[]);
        match locate(&acquired, "TARGET", &PanicExtractor, DEFAULT_SCAN_BUDGET).await {
            LocateResult::Snippet { window_start, .. } => assert_eq!(window_start, 0),
            other => panic!("expected a snippet, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn documents_are_scanned_in_order_and_first_match_returned() {
        let extractor = MapExtractor {
            docs: vec![
                ("https://example.edu/a.pdf", Ok("unrelated")),
                ("https://example.edu/b.pdf", Ok("the Admit Card 2025 schedule")),
                ("https://example.edu/c.pdf", Ok("also has admit card 2025")),
            ],
            calls: Mutex::new(Vec::new()),
        };
        let acquired = content(
            "no match in the body",
            &["https://example.edu/a.pdf", "https://example.edu/b.pdf", "https://example.edu/c.pdf"],
        );
        let result = locate(&acquired, "admit card 2025", &extractor, DEFAULT_SCAN_BUDGET).await;
        assert_eq!(
            result,
            LocateResult::Document {
                url: "https://example.edu/b.pdf".to_string()
            }
        );
        assert_eq!(extractor.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unreadable_documents_are_skipped_not_fatal() {
        let extractor = MapExtractor {
            docs: vec![
                ("https://example.edu/a.pdf", Err(())),
                ("https://example.edu/b.pdf", Ok("admit card inside")),
            ],
            calls: Mutex::new(Vec::new()),
        };
        let acquired = content("", &["https://example.edu/a.pdf", "https://example.edu/b.pdf"]);
        let result = locate(&acquired, "admit card", &extractor, DEFAULT_SCAN_BUDGET).await;
        assert_eq!(
            result,
            LocateResult::Document {
                url: "https://example.edu/b.pdf".to_string()
            }
        );
    }

    #[tokio::test]
    async fn relative_links_resolve_against_the_source_host() {
        let extractor = MapExtractor {
            docs: vec![("https://example.edu/files/n1.pdf", Ok("admit card"))],
            calls: Mutex::new(Vec::new()),
        };
        let acquired = content("", &["/files/n1.pdf"]);
        let result = locate(&acquired, "admit card", &extractor, DEFAULT_SCAN_BUDGET).await;
        assert_eq!(
            result,
            LocateResult::Document {
                url: "https://example.edu/files/n1.pdf".to_string()
            }
        );
    }

    #[tokio::test]
    async fn zero_budget_scans_nothing() {
        let acquired = content("", &["https://example.edu/a.pdf"]);
        let result = locate(&acquired, "admit card", &PanicExtractor, Duration::ZERO).await;
        assert_eq!(result, LocateResult::NotFound);
    }

    #[tokio::test]
    async fn exhausted_budget_stops_between_documents() {
        let extractor = SlowExtractor {
            delay: Duration::from_millis(40),
            calls: AtomicUsize::new(0),
        };
        let acquired = content(
            "",
            &["https://example.edu/a.pdf", "https://example.edu/b.pdf", "https://example.edu/c.pdf"],
        );
        let result = locate(&acquired, "admit card", &extractor, Duration::from_millis(15)).await;
        assert_eq!(result, LocateResult::NotFound);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    }
}
