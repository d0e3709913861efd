use anyhow::Result;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::db;
use crate::fetch::{AcquiredContent, Fetcher, Strategy};

/// Decides how a URL gets fetched and remembers what worked.
///
/// A URL with no record is probed in ascending cost order, stopping at the
/// first success. A URL with a record leads with the remembered strategy and,
/// if that fails, cascades through the remaining untried strategies in
/// ascending cost order before giving up. Strategies never run concurrently;
/// each one carries a real-world cost that should not be paid speculatively.
pub struct AcquisitionEngine<'a> {
    conn: &'a Connection,
    fetchers: &'a [Box<dyn Fetcher>],
}

impl<'a> AcquisitionEngine<'a> {
    pub fn new(conn: &'a Connection, fetchers: &'a [Box<dyn Fetcher>]) -> Self {
        Self { conn, fetchers }
    }

    /// Total failure is not an error: the caller gets empty content and the
    /// request stays reportable.
    pub async fn acquire(&self, url: &str) -> Result<AcquiredContent> {
        let remembered = db::get_strategy(self.conn, url)?;

        let mut order: Vec<Strategy> = Vec::with_capacity(Strategy::COST_ORDER.len());
        if let Some(rec) = &remembered {
            info!("remembered strategy for {}: {}", url, rec.strategy.as_str());
            order.push(rec.strategy);
        }
        for strategy in Strategy::COST_ORDER {
            if !order.contains(&strategy) {
                order.push(strategy);
            }
        }

        for strategy in order {
            let Some(fetcher) = self.fetchers.iter().find(|f| f.strategy() == strategy) else {
                continue;
            };
            info!("attempting {} fetch for {}", strategy.as_str(), url);
            match fetcher.fetch(url).await {
                Ok(content) => {
                    db::record_fetch_success(self.conn, url, strategy)?;
                    return Ok(content);
                }
                Err(e) => {
                    warn!("{} fetch failed for {}: {}", strategy.as_str(), url, e);
                    db::record_fetch_failure(self.conn, url)?;
                }
            }
        }

        warn!("all fetch strategies exhausted for {}", url);
        Ok(AcquiredContent {
            text: String::new(),
            document_links: Vec::new(),
            source_url: url.to_string(),
        })
    }
}

// ── Tests ──
