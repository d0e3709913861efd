use anyhow::Result;
use rusqlite::Connection;

use crate::fetch::Strategy;

const DB_PATH: &str = "data/notifind.sqlite";

pub fn connect() -> Result<Connection> {
    std::fs::create_dir_all("data")?;
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS strategy_records (
            url               TEXT PRIMARY KEY,
            strategy          TEXT NOT NULL CHECK(strategy IN ('plain','rendered','crawled')),
            last_attempted_at TEXT NOT NULL,
            last_succeeded_at TEXT,
            fail_count        INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS page_mappings (
            domain                TEXT PRIMARY KEY,
            notification_page_url TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS notifications (
            id           INTEGER PRIMARY KEY,
            title        TEXT NOT NULL,
            url          TEXT NOT NULL,
            published_at TEXT,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_notifications_created ON notifications(created_at);

        CREATE TABLE IF NOT EXISTS scheduled_requests (
            id                INTEGER PRIMARY KEY,
            domain_or_url     TEXT NOT NULL,
            notification_name TEXT NOT NULL,
            recipient         TEXT,
            active            BOOLEAN NOT NULL DEFAULT 1,
            claimed_at        TEXT,
            created_at        TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_requests_active ON scheduled_requests(active);
        ",
    )?;
    Ok(())
}

// ── Strategy records ──

pub struct StrategyRecord {
    pub url: String,
    pub strategy: Strategy,
    pub last_attempted_at: String,
    pub last_succeeded_at: Option<String>,
    pub fail_count: i64,
}

fn strategy_from_row(row: &rusqlite::Row) -> rusqlite::Result<StrategyRecord> {
    let raw: String = row.get(1)?;
    let strategy = Strategy::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown strategy '{raw}'").into(),
        )
    })?;
    Ok(StrategyRecord {
        url: row.get(0)?,
        strategy,
        last_attempted_at: row.get(2)?,
        last_succeeded_at: row.get(3)?,
        fail_count: row.get(4)?,
    })
}

pub fn get_strategy(conn: &Connection, url: &str) -> Result<Option<StrategyRecord>> {
    let mut stmt = conn.prepare(
        "SELECT url, strategy, last_attempted_at, last_succeeded_at, fail_count
         FROM strategy_records WHERE url = ?1",
    )?;
    let mut rows = stmt.query_map([url], strategy_from_row)?;
    Ok(rows.next().transpose()?)
}

pub fn fetch_strategies(conn: &Connection) -> Result<Vec<StrategyRecord>> {
    let mut stmt = conn.prepare(
        "SELECT url, strategy, last_attempted_at, last_succeeded_at, fail_count
         FROM strategy_records ORDER BY last_attempted_at DESC, url",
    )?;
    let rows = stmt
        .query_map([], strategy_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Remember the strategy that just worked for a URL. A single atomic upsert:
/// existing records are reassigned and their failure streak cleared.
pub fn record_fetch_success(conn: &Connection, url: &str, strategy: Strategy) -> Result<()> {
    conn.execute(
        "INSERT INTO strategy_records (url, strategy, last_attempted_at, last_succeeded_at, fail_count)
         VALUES (?1, ?2, datetime('now'), datetime('now'), 0)
         ON CONFLICT(url) DO UPDATE SET
             strategy = excluded.strategy,
             last_attempted_at = excluded.last_attempted_at,
             last_succeeded_at = excluded.last_succeeded_at,
             fail_count = 0",
        rusqlite::params![url, strategy.as_str()],
    )?;
    Ok(())
}

/// Records are only created on success, so a failure on a never-seen URL is a no-op.
pub fn record_fetch_failure(conn: &Connection, url: &str) -> Result<()> {
    conn.execute(
        "UPDATE strategy_records
         SET fail_count = fail_count + 1, last_attempted_at = datetime('now')
         WHERE url = ?1",
        [url],
    )?;
    Ok(())
}

// ── Page mappings ──

pub fn get_mapping(conn: &Connection, domain: &str) -> Result<Option<String>> {
    let mut stmt =
        conn.prepare("SELECT notification_page_url FROM page_mappings WHERE domain = ?1")?;
    let mut rows = stmt.query_map([domain], |row| row.get(0))?;
    Ok(rows.next().transpose()?)
}

/// Seed (domain, notification page URL) pairs. Existing domains are left untouched.
pub fn seed_mappings(conn: &Connection, mappings: &[(String, String)]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO page_mappings (domain, notification_page_url) VALUES (?1, ?2)",
        )?;
        for (domain, url) in mappings {
            count += stmt.execute(rusqlite::params![domain, url])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Notifications ──

pub struct NotificationRow {
    pub title: String,
    pub url: String,
    pub published_at: Option<String>,
    pub created_at: String,
}

pub fn insert_notification(
    conn: &Connection,
    title: &str,
    url: &str,
    published_at: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO notifications (title, url, published_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![title, url, published_at],
    )?;
    Ok(())
}

pub fn fetch_notifications(conn: &Connection, limit: usize) -> Result<Vec<NotificationRow>> {
    let mut stmt = conn.prepare(
        "SELECT title, url, published_at, created_at
         FROM notifications ORDER BY created_at DESC, id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit], |row| {
            Ok(NotificationRow {
                title: row.get(0)?,
                url: row.get(1)?,
                published_at: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Scheduled requests ──

pub struct ScheduledRequest {
    pub id: i64,
    pub domain_or_url: String,
    pub notification_name: String,
    pub recipient: Option<String>,
}

pub fn insert_request(
    conn: &Connection,
    domain_or_url: &str,
    notification_name: &str,
    recipient: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO scheduled_requests (domain_or_url, notification_name, recipient)
         VALUES (?1, ?2, ?3)",
        rusqlite::params![domain_or_url, notification_name, recipient],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn fetch_active_requests(conn: &Connection) -> Result<Vec<ScheduledRequest>> {
    let mut stmt = conn.prepare(
        "SELECT id, domain_or_url, notification_name, recipient
         FROM scheduled_requests WHERE active = 1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ScheduledRequest {
                id: row.get(0)?,
                domain_or_url: row.get(1)?,
                notification_name: row.get(2)?,
                recipient: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Claim a request for one recheck pass. The compare-and-set on `claimed_at`
/// keeps two concurrent passes from processing the same row; claims older
/// than `stale_minutes` are treated as abandoned and can be re-taken.
pub fn claim_request(conn: &Connection, id: i64, stale_minutes: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE scheduled_requests
         SET claimed_at = datetime('now')
         WHERE id = ?1 AND active = 1
           AND (claimed_at IS NULL OR claimed_at < datetime('now', ?2))",
        rusqlite::params![id, format!("-{stale_minutes} minutes")],
    )?;
    Ok(changed > 0)
}

pub fn release_request(conn: &Connection, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE scheduled_requests SET claimed_at = NULL WHERE id = ?1",
        [id],
    )?;
    Ok(())
}

pub fn deactivate_request(conn: &Connection, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE scheduled_requests SET active = 0, claimed_at = NULL WHERE id = ?1",
        [id],
    )?;
    Ok(())
}

// ── Stats ──

pub struct Stats {
    pub mappings: usize,
    pub strategies: usize,
    pub notifications: usize,
    pub active_requests: usize,
    pub total_requests: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let mappings: usize = conn.query_row("SELECT COUNT(*) FROM page_mappings", [], |r| r.get(0))?;
    let strategies: usize =
        conn.query_row("SELECT COUNT(*) FROM strategy_records", [], |r| r.get(0))?;
    let notifications: usize =
        conn.query_row("SELECT COUNT(*) FROM notifications", [], |r| r.get(0))?;
    let active_requests: usize = conn.query_row(
        "SELECT COUNT(*) FROM scheduled_requests WHERE active = 1",
        [],
        |r| r.get(0),
    )?;
    let total_requests: usize =
        conn.query_row("SELECT COUNT(*) FROM scheduled_requests", [], |r| r.get(0))?;
    Ok(Stats {
        mappings,
        strategies,
        notifications,
        active_requests,
        total_requests,
    })
}

// ── Tests ──

#[cfg(test)]
pub(crate) fn test_conn() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    conn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_creates_then_reassigns_record() {
        let conn = test_conn();
        record_fetch_success(&conn, "https://a.example/n", Strategy::Plain).unwrap();
        let rec = get_strategy(&conn, "https://a.example/n").unwrap().unwrap();
        assert_eq!(rec.strategy, Strategy::Plain);
        assert_eq!(rec.fail_count, 0);
        assert!(rec.last_succeeded_at.is_some());

        record_fetch_failure(&conn, "https://a.example/n").unwrap();
        record_fetch_failure(&conn, "https://a.example/n").unwrap();
        let rec = get_strategy(&conn, "https://a.example/n").unwrap().unwrap();
        assert_eq!(rec.fail_count, 2);

        record_fetch_success(&conn, "https://a.example/n", Strategy::Rendered).unwrap();
        let rec = get_strategy(&conn, "https://a.example/n").unwrap().unwrap();
        assert_eq!(rec.strategy, Strategy::Rendered);
        assert_eq!(rec.fail_count, 0);
    }

    #[test]
    fn failure_without_record_is_noop() {
        let conn = test_conn();
        record_fetch_failure(&conn, "https://never-seen.example").unwrap();
        assert!(get_strategy(&conn, "https://never-seen.example")
            .unwrap()
            .is_none());
    }

    #[test]
    fn seeding_skips_existing_domains() {
        let conn = test_conn();
        let first = vec![(
            "nta.ac.in".to_string(),
            "https://www.nta.ac.in/NoticeBoardArchive".to_string(),
        )];
        assert_eq!(seed_mappings(&conn, &first).unwrap(), 1);

        let second = vec![
            ("nta.ac.in".to_string(), "https://elsewhere.example".to_string()),
            (
                "cusrinagar.edu.in".to_string(),
                "https://www.cusrinagar.edu.in/Notification/NotificationListPartial".to_string(),
            ),
        ];
        assert_eq!(seed_mappings(&conn, &second).unwrap(), 1);
        assert_eq!(
            get_mapping(&conn, "nta.ac.in").unwrap().as_deref(),
            Some("https://www.nta.ac.in/NoticeBoardArchive")
        );
    }

    #[test]
    fn claim_is_exclusive_until_released() {
        let conn = test_conn();
        let id = insert_request(&conn, "example.edu", "Admit Card", None).unwrap();

        assert!(claim_request(&conn, id, 10).unwrap());
        assert!(!claim_request(&conn, id, 10).unwrap());

        release_request(&conn, id).unwrap();
        assert!(claim_request(&conn, id, 10).unwrap());

        deactivate_request(&conn, id).unwrap();
        assert!(!claim_request(&conn, id, 10).unwrap());
        assert!(fetch_active_requests(&conn).unwrap().is_empty());
    }

    #[test]
    fn notifications_are_append_only_and_ordered() {
        let conn = test_conn();
        insert_notification(&conn, "Admit Card 2025", "https://a.example/1.pdf", Some("2025-04-12"))
            .unwrap();
        insert_notification(&conn, "Result Circular", "https://a.example/2.pdf", None).unwrap();

        let rows = fetch_notifications(&conn, 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title, "Result Circular");
        assert_eq!(rows[1].published_at.as_deref(), Some("2025-04-12"));
    }
}
