use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::ai::{self, TextOracle};
use crate::db;
use crate::engine::AcquisitionEngine;
use crate::fetch::crawled::CrawledFetcher;
use crate::fetch::plain::PlainFetcher;
use crate::fetch::rendered::RenderedFetcher;
use crate::fetch::Fetcher;
use crate::locate::{self, DocumentExtractor, LocateResult, DEFAULT_SCAN_BUDGET};
use crate::notify::Mailer;
use crate::pdf::PdfExtractor;
use crate::resolver;
use crate::search::{GoogleSearch, NullSearch, SearchOracle};

/// Product copy: a miss is reported as ongoing monitoring, never as an error.
pub const MONITORING_COPY: &str =
    "No specific update found yet, but monitoring has started for this notification.";

const CLAIM_STALE_MINUTES: i64 = 10;

pub struct FindOutcome {
    pub found: bool,
    pub snippet: Option<String>,
    pub document_url: Option<String>,
    pub message: String,
}

/// Front door for callers: wires the resolver, acquisition engine, locator
/// and collaborators together for one-shot lookups and scheduled rechecks.
pub struct Service<'a> {
    conn: &'a Connection,
    search: Box<dyn SearchOracle>,
    extractor: Box<dyn DocumentExtractor>,
    fetchers: Vec<Box<dyn Fetcher>>,
    oracle: Option<TextOracle>,
    mailer: Option<Mailer>,
    scan_budget: Duration,
}

impl<'a> Service<'a> {
    pub fn new(conn: &'a Connection) -> Result<Self> {
        let search: Box<dyn SearchOracle> = match GoogleSearch::from_env() {
            Some(google) => Box::new(google),
            None => {
                warn!("no search credentials configured; resolution falls back to bare domains");
                Box::new(NullSearch)
            }
        };
        Ok(Self {
            conn,
            search,
            extractor: Box::new(PdfExtractor::new()),
            fetchers: vec![
                Box::new(PlainFetcher::new()?),
                Box::new(RenderedFetcher),
                Box::new(CrawledFetcher),
            ],
            oracle: Some(TextOracle::from_env()),
            mailer: Mailer::from_env(),
            scan_budget: DEFAULT_SCAN_BUDGET,
        })
    }

    #[cfg(test)]
    fn with_parts(
        conn: &'a Connection,
        search: Box<dyn SearchOracle>,
        extractor: Box<dyn DocumentExtractor>,
        fetchers: Vec<Box<dyn Fetcher>>,
    ) -> Self {
        Self {
            conn,
            search,
            extractor,
            fetchers,
            oracle: None,
            mailer: None,
            scan_budget: DEFAULT_SCAN_BUDGET,
        }
    }

    /// Resolve, acquire, locate. A hit is recorded in the notification sink;
    /// a miss comes back as the monitoring message, never an error.
    pub async fn find_notification(&self, domain_or_url: &str, name: &str) -> Result<FindOutcome> {
        let target = resolver::resolve(self.conn, self.search.as_ref(), domain_or_url).await?;
        info!("searching for \"{}\" at {}", name, target.url);

        let engine = AcquisitionEngine::new(self.conn, &self.fetchers);
        let acquired = engine.acquire(&target.url).await?;
        info!(
            "acquired {} chars and {} document links from {}",
            acquired.text.chars().count(),
            acquired.document_links.len(),
            target.url
        );

        match locate::locate(&acquired, name, self.extractor.as_ref(), self.scan_budget).await {
            LocateResult::Snippet { content, .. } => {
                db::insert_notification(self.conn, name, &target.url, None)?;
                let message = match &self.oracle {
                    Some(oracle) => {
                        ai::summarize(oracle, &target.normalized_domain, name, &content)
                            .await
                            .unwrap_or_else(|| found_copy(name))
                    }
                    None => found_copy(name),
                };
                Ok(FindOutcome {
                    found: true,
                    snippet: Some(content),
                    document_url: None,
                    message,
                })
            }
            LocateResult::Document { url } => {
                let published = published_date_from_url(&url).map(|d| d.to_string());
                db::insert_notification(self.conn, name, &url, published.as_deref())?;
                Ok(FindOutcome {
                    found: true,
                    snippet: None,
                    document_url: Some(url.clone()),
                    message: format!("Notification found inside a linked document: {url}"),
                })
            }
            LocateResult::NotFound => Ok(FindOutcome {
                found: false,
                snippet: None,
                document_url: None,
                message: MONITORING_COPY.to_string(),
            }),
        }
    }

    /// One pass over the active scheduled requests. Each row is claimed
    /// before processing so overlapping passes never double-handle it;
    /// satisfied requests are deactivated, misses stay active.
    pub async fn recheck_pending(&self) -> Result<()> {
        let requests = db::fetch_active_requests(self.conn)?;
        if requests.is_empty() {
            info!("no active scheduled requests");
            return Ok(());
        }

        let pb = ProgressBar::new(requests.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len}")?
                .progress_chars("=> "),
        );

        for req in requests {
            if !db::claim_request(self.conn, req.id, CLAIM_STALE_MINUTES)? {
                info!("request {} already claimed, skipping", req.id);
                pb.inc(1);
                continue;
            }

            match self
                .find_notification(&req.domain_or_url, &req.notification_name)
                .await
            {
                Ok(outcome) if outcome.found => {
                    if let (Some(mailer), Some(recipient)) = (&self.mailer, &req.recipient) {
                        mailer
                            .send(
                                recipient,
                                &format!("Notification Found: {}", req.notification_name),
                                &outcome.message,
                            )
                            .await;
                    }
                    db::deactivate_request(self.conn, req.id)?;
                    info!("request {} satisfied and deactivated", req.id);
                }
                Ok(_) => {
                    db::release_request(self.conn, req.id)?;
                }
                Err(e) => {
                    warn!("recheck of request {} failed: {}", req.id, e);
                    db::release_request(self.conn, req.id)?;
                }
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        Ok(())
    }
}

fn found_copy(name: &str) -> String {
    format!("An update matching \"{name}\" was found; updates are being monitored.")
}

/// Some sources embed the publication date in the document filename as
/// `..._YYYYMMDDhhmmss.pdf`. Absence is fine; this is best-effort only.
pub fn published_date_from_url(url: &str) -> Option<NaiveDate> {
    let lower = url.to_ascii_lowercase();
    let dot = lower.rfind(".pdf")?;
    let underscore = url[..dot].rfind('_')?;
    let stamp: String = url[underscore + 1..dot].chars().take(8).collect();
    if stamp.len() < 8 || !stamp.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(&stamp, "%Y%m%d").ok()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::db::test_conn;
    use crate::error::ScrapeError;
    use crate::fetch::{AcquiredContent, Strategy};
    use crate::search::SearchHit;

    struct PanicSearch;

    #[async_trait]
    impl SearchOracle for PanicSearch {
        async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, ScrapeError> {
            panic!("search must not run when a page mapping exists");
        }
    }

    struct EmptySearch;

    #[async_trait]
    impl SearchOracle for EmptySearch {
        async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, ScrapeError> {
            Ok(Vec::new())
        }
    }

    struct FakeFetcher {
        strategy: Strategy,
        outcome: Option<(&'static str, Vec<&'static str>)>,
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        fn strategy(&self) -> Strategy {
            self.strategy
        }

        async fn fetch(&self, url: &str) -> Result<AcquiredContent, ScrapeError> {
            match &self.outcome {
                Some((text, links)) => Ok(AcquiredContent {
                    text: text.to_string(),
                    document_links: links.iter().map(|s| s.to_string()).collect(),
                    source_url: url.to_string(),
                }),
                None => Err(ScrapeError::Transport("connection refused".into())),
            }
        }
    }

    struct FixedExtractor(&'static str);

    #[async_trait]
    impl DocumentExtractor for FixedExtractor {
        async fn extract(&self, _url: &str) -> Result<String, ScrapeError> {
            Ok(self.0.to_string())
        }
    }

    fn seed_example_mapping(conn: &Connection) {
        db::seed_mappings(
            conn,
            &[("example.edu".to_string(), "https://example.edu/notices".to_string())],
        )
        .unwrap();
    }

    #[tokio::test]
    async fn phrase_in_page_body_yields_a_snippet() {
        let conn = test_conn();
        seed_example_mapping(&conn);
        let service = Service::with_parts(
            &conn,
            Box::new(PanicSearch),
            Box::new(FixedExtractor("")),
            vec![Box::new(FakeFetcher {
                strategy: Strategy::Plain,
                outcome: Some(("Notice board: Admit Card 2025 is now available.", vec![])),
            })],
        );

        let outcome = service
            .find_notification("example.edu", "Admit Card 2025")
            .await
            .unwrap();
        assert!(outcome.found);
        assert!(outcome.snippet.unwrap().contains("Admit Card 2025"));
        assert!(outcome.document_url.is_none());
        assert_eq!(db::fetch_notifications(&conn, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn phrase_only_inside_a_document_yields_its_url() {
        let conn = test_conn();
        seed_example_mapping(&conn);
        let service = Service::with_parts(
            &conn,
            Box::new(PanicSearch),
            Box::new(FixedExtractor("Schedule for Admit Card 2025 download")),
            vec![Box::new(FakeFetcher {
                strategy: Strategy::Plain,
                outcome: Some(("Nothing relevant in the body.", vec!["https://example.edu/notice1.pdf"])),
            })],
        );

        let outcome = service
            .find_notification("example.edu", "Admit Card 2025")
            .await
            .unwrap();
        assert!(outcome.found);
        assert_eq!(
            outcome.document_url.as_deref(),
            Some("https://example.edu/notice1.pdf")
        );
        assert!(outcome.snippet.is_none());

        let recorded = db::fetch_notifications(&conn, 10).unwrap();
        assert_eq!(recorded[0].url, "https://example.edu/notice1.pdf");
    }

    #[tokio::test]
    async fn failed_plain_fetch_falls_back_and_still_reports_a_miss_neutrally() {
        let conn = test_conn();
        seed_example_mapping(&conn);
        let service = Service::with_parts(
            &conn,
            Box::new(PanicSearch),
            Box::new(FixedExtractor("")),
            vec![
                Box::new(FakeFetcher {
                    strategy: Strategy::Plain,
                    outcome: None,
                }),
                Box::new(FakeFetcher {
                    strategy: Strategy::Rendered,
                    outcome: Some(("", vec![])),
                }),
            ],
        );

        let outcome = service
            .find_notification("example.edu", "Admit Card 2025")
            .await
            .unwrap();
        assert!(!outcome.found);
        assert_eq!(outcome.message, MONITORING_COPY);

        let rec = db::get_strategy(&conn, "https://example.edu/notices")
            .unwrap()
            .unwrap();
        assert_eq!(rec.strategy, Strategy::Rendered);
    }

    #[tokio::test]
    async fn unmapped_domain_with_no_search_results_fetches_the_bare_domain() {
        let conn = test_conn();
        let service = Service::with_parts(
            &conn,
            Box::new(EmptySearch),
            Box::new(FixedExtractor("")),
            vec![Box::new(FakeFetcher {
                strategy: Strategy::Plain,
                outcome: Some(("Admit Card 2025 right on the homepage", vec![])),
            })],
        );

        let outcome = service
            .find_notification("example.edu", "Admit Card 2025")
            .await
            .unwrap();
        assert!(outcome.found);
        assert!(db::get_strategy(&conn, "https://example.edu").unwrap().is_some());
    }

    #[tokio::test]
    async fn satisfied_requests_are_deactivated_and_misses_stay_active() {
        let conn = test_conn();
        seed_example_mapping(&conn);
        let hit = db::insert_request(&conn, "example.edu", "Admit Card 2025", None).unwrap();
        let miss = db::insert_request(&conn, "example.edu", "Something Else", None).unwrap();

        let service = Service::with_parts(
            &conn,
            Box::new(PanicSearch),
            Box::new(FixedExtractor("")),
            vec![Box::new(FakeFetcher {
                strategy: Strategy::Plain,
                outcome: Some(("Admit Card 2025 is live.", vec![])),
            })],
        );
        service.recheck_pending().await.unwrap();

        let active = db::fetch_active_requests(&conn).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, miss);
        assert_ne!(active[0].id, hit);
        // The miss was released, so the next pass can claim it again.
        assert!(db::claim_request(&conn, miss, CLAIM_STALE_MINUTES).unwrap());
    }

    #[test]
    fn filename_timestamps_become_publication_dates() {
        assert_eq!(
            published_date_from_url("https://nta.ac.in/Download/Notice/Notice_20250412153000.pdf"),
            NaiveDate::from_ymd_opt(2025, 4, 12)
        );
        assert_eq!(
            published_date_from_url("https://example.edu/docs/plain-notice.pdf"),
            None
        );
        assert_eq!(published_date_from_url("https://example.edu/docs/notice_abc.pdf"), None);
        assert_eq!(published_date_from_url("https://example.edu/page.html"), None);
    }
}
