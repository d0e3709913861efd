use anyhow::Result;
use rusqlite::Connection;
use tracing::{info, warn};
use url::Url;

use crate::db;
use crate::search::SearchOracle;

// URLs containing one of these are taken over earlier search results.
const PAGE_KEYWORDS: [&str; 4] = ["notification", "notice", "news", "update"];

#[derive(Debug, Clone)]
pub struct FetchTarget {
    pub url: String,
    pub normalized_domain: String,
}

/// Turn a user-supplied domain or URL into the concrete page to fetch.
///
/// A known page mapping wins outright; otherwise the search oracle is asked
/// for a notifications page, and when that produces nothing usable the bare
/// domain itself is fetched. Mappings are only ever read here.
pub async fn resolve(
    conn: &Connection,
    oracle: &dyn SearchOracle,
    domain_or_url: &str,
) -> Result<FetchTarget> {
    let domain = normalize_domain(domain_or_url);

    if let Some(mapped) = db::get_mapping(conn, &domain)? {
        info!("mapped notifications page for {}: {}", domain, mapped);
        return Ok(FetchTarget {
            url: mapped,
            normalized_domain: domain,
        });
    }

    let query = format!("site:{domain} notifications");
    let url = match oracle.search(&query).await {
        Ok(hits) if !hits.is_empty() => {
            let preferred = hits.iter().find(|h| {
                let link = h.link.to_ascii_lowercase();
                PAGE_KEYWORDS.iter().any(|k| link.contains(k))
            });
            match preferred {
                Some(hit) => {
                    info!("notifications page via search: {}", hit.link);
                    hit.link.clone()
                }
                None => {
                    info!("no keyword match in search results, taking the first: {}", hits[0].link);
                    hits[0].link.clone()
                }
            }
        }
        Ok(_) => {
            info!("search found nothing for {}, falling back to the domain", domain);
            ensure_scheme(&domain)
        }
        Err(e) => {
            warn!("search failed for {}: {}; falling back to the domain", domain, e);
            ensure_scheme(&domain)
        }
    };

    Ok(FetchTarget {
        url: ensure_scheme(&url),
        normalized_domain: domain,
    })
}

/// Reduce a domain or URL to its bare host: no scheme, no path.
pub fn normalize_domain(domain_or_url: &str) -> String {
    let with_scheme = ensure_scheme(domain_or_url.trim());
    match Url::parse(&with_scheme) {
        Ok(parsed) => parsed
            .host_str()
            .map(str::to_string)
            .unwrap_or_else(|| domain_or_url.trim().to_string()),
        Err(_) => domain_or_url.trim().trim_matches('/').to_string(),
    }
}

pub fn ensure_scheme(s: &str) -> String {
    if s.starts_with("http://") || s.starts_with("https://") {
        s.to_string()
    } else {
        format!("https://{s}")
    }
}

// ── Tests ──
