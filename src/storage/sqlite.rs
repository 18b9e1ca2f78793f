//! SQLite store
//!
//! The store holds a fixed pool of connections, handed out round-robin,
//! each behind its own lock. WAL mode lets readers and the single writer
//! proceed together; transient busy/locked errors are retried a bounded
//! number of times before surfacing.

use crate::storage::schema::initialize_schema;
use crate::storage::{
    CachedPage, FrontierRecord, RobotsRecord, StorageResult, StoreCounts,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::warn;

/// Attempts per operation when SQLite reports busy/locked
const MAX_RETRIES: u32 = 3;
/// Pause between retry attempts
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// SQLite storage backend with a fixed connection pool
pub struct SqliteStore {
    connections: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

impl SqliteStore {
    /// Opens (or creates) the database and the connection pool
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `pool_size` - Number of connections to open (at least 1)
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Database opened and schema initialized
    /// * `Err(StorageError)` - Failed to open or initialize
    pub fn open(path: &Path, pool_size: usize) -> StorageResult<Self> {
        let pool_size = pool_size.max(1);
        let mut connections = Vec::with_capacity(pool_size);
        for i in 0..pool_size {
            let conn = Connection::open(path)?;
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA temp_store = MEMORY;
            ",
            )?;
            conn.busy_timeout(Duration::from_secs(5))?;
            if i == 0 {
                initialize_schema(&conn)?;
            }
            connections.push(Mutex::new(conn));
        }
        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
        })
    }

    /// Hands out the next pooled connection, round-robin
    fn conn(&self) -> MutexGuard<'_, Connection> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        self.connections[idx].lock().unwrap()
    }

    /// Runs an operation, retrying on transient busy/locked errors
    fn with_retry<T, F>(&self, op: F) -> StorageResult<T>
    where
        F: Fn(&mut Connection) -> Result<T, rusqlite::Error>,
    {
        let mut attempt = 0;
        loop {
            let result = {
                let mut conn = self.conn();
                op(&mut *conn)
            };
            match result {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) && attempt + 1 < MAX_RETRIES => {
                    attempt += 1;
                    warn!(attempt, error = %e, "transient database error, retrying");
                    std::thread::sleep(RETRY_DELAY);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ===== Frontier / visited set =====

    /// Inserts a frontier entry unless the URL is visited or already queued
    ///
    /// The check and the insert are a single SQL statement, so two workers
    /// racing on the same URL cannot both enqueue it. With `ignore_visited`
    /// the visited set is not consulted (re-scrape mode); the queue itself
    /// still dedups.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The URL was added to the frontier
    /// * `Ok(false)` - The URL was already visited or queued
    pub fn frontier_push(
        &self,
        record: &FrontierRecord,
        ignore_visited: bool,
    ) -> StorageResult<bool> {
        self.with_retry(|conn| {
            let changed = if ignore_visited {
                conn.execute(
                    "INSERT OR IGNORE INTO frontier (url, priority, depth, parent_url)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![record.url, record.priority, record.depth, record.parent],
                )?
            } else {
                conn.execute(
                    "INSERT OR IGNORE INTO frontier (url, priority, depth, parent_url)
                     SELECT ?1, ?2, ?3, ?4
                     WHERE NOT EXISTS (SELECT 1 FROM visited_urls WHERE url = ?1)",
                    params![record.url, record.priority, record.depth, record.parent],
                )?
            };
            Ok(changed == 1)
        })
    }

    /// Removes and returns the most urgent frontier entry
    ///
    /// Ordering is ascending priority, then insertion order. Returns
    /// `Ok(None)` when the frontier is empty.
    pub fn frontier_pop(&self) -> StorageResult<Option<FrontierRecord>> {
        self.with_retry(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let record = tx
                .query_row(
                    "SELECT url, priority, depth, parent_url FROM frontier
                     ORDER BY priority ASC, id ASC LIMIT 1",
                    [],
                    |row| {
                        Ok(FrontierRecord {
                            url: row.get(0)?,
                            priority: row.get(1)?,
                            depth: row.get(2)?,
                            parent: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            if let Some(ref rec) = record {
                tx.execute("DELETE FROM frontier WHERE url = ?1", params![rec.url])?;
            }
            tx.commit()?;
            Ok(record)
        })
    }

    /// Marks a batch of URLs visited and removes them from the frontier
    ///
    /// The whole batch is one transaction: either every URL is marked and
    /// dequeued, or none is.
    pub fn mark_visited_bulk(&self, urls: &[String]) -> StorageResult<()> {
        self.with_retry(|conn| {
            let now = Utc::now().to_rfc3339();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            for url in urls {
                tx.execute(
                    "INSERT OR IGNORE INTO visited_urls (url, visited_at) VALUES (?1, ?2)",
                    params![url, now],
                )?;
                tx.execute("DELETE FROM frontier WHERE url = ?1", params![url])?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Checks whether a URL is in the visited set
    pub fn is_visited(&self, url: &str) -> StorageResult<bool> {
        self.with_retry(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM visited_urls WHERE url = ?1",
                    params![url],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Number of entries waiting in the frontier
    pub fn frontier_len(&self) -> StorageResult<u64> {
        self.with_retry(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM frontier", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    /// Clears the frontier and the visited set
    ///
    /// Robots rules and cached pages are kept.
    pub fn clear_crawl_state(&self) -> StorageResult<()> {
        self.with_retry(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute("DELETE FROM frontier", [])?;
            tx.execute("DELETE FROM visited_urls", [])?;
            tx.commit()?;
            Ok(())
        })
    }

    // ===== Robots rules =====

    /// Replaces the stored rule set for a domain wholesale
    pub fn save_robots(&self, domain: &str, record: &RobotsRecord) -> StorageResult<()> {
        self.with_retry(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute("DELETE FROM robots_rules WHERE domain = ?1", params![domain])?;
            for (pos, rule) in record.allow.iter().enumerate() {
                tx.execute(
                    "INSERT INTO robots_rules (domain, kind, rule, position) VALUES (?1, 'allow', ?2, ?3)",
                    params![domain, rule, pos as i64],
                )?;
            }
            for (pos, rule) in record.disallow.iter().enumerate() {
                tx.execute(
                    "INSERT INTO robots_rules (domain, kind, rule, position) VALUES (?1, 'disallow', ?2, ?3)",
                    params![domain, rule, pos as i64],
                )?;
            }
            tx.execute(
                "INSERT OR REPLACE INTO robots_meta (domain, fetched_at, crawl_delay) VALUES (?1, ?2, ?3)",
                params![domain, record.fetched_at.to_rfc3339(), record.crawl_delay],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Loads the stored rule set for a domain, if any
    pub fn load_robots(&self, domain: &str) -> StorageResult<Option<RobotsRecord>> {
        self.with_retry(|conn| {
            let meta: Option<(String, Option<f64>)> = conn
                .query_row(
                    "SELECT fetched_at, crawl_delay FROM robots_meta WHERE domain = ?1",
                    params![domain],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let (fetched_str, crawl_delay) = match meta {
                Some(m) => m,
                None => return Ok(None),
            };
            let fetched_at = fetched_str
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now());

            let mut stmt = conn.prepare(
                "SELECT kind, rule FROM robots_rules WHERE domain = ?1 ORDER BY kind, position",
            )?;
            let mut allow = Vec::new();
            let mut disallow = Vec::new();
            let rows = stmt.query_map(params![domain], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (kind, rule) = row?;
                if kind == "allow" {
                    allow.push(rule);
                } else {
                    disallow.push(rule);
                }
            }

            Ok(Some(RobotsRecord {
                allow,
                disallow,
                crawl_delay,
                fetched_at,
            }))
        })
    }

    // ===== Page cache =====

    /// Stores a fetched page, replacing any previous copy
    pub fn cache_page(&self, page: &CachedPage) -> StorageResult<()> {
        self.with_retry(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO page_cache
                 (url, content, content_type, status, content_length, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    page.url,
                    page.content,
                    page.content_type,
                    page.status,
                    page.content.len() as i64,
                    page.fetched_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Loads a cached page, if present
    pub fn get_cached_page(&self, url: &str) -> StorageResult<Option<CachedPage>> {
        self.with_retry(|conn| {
            let page = conn
                .query_row(
                    "SELECT url, content, content_type, status, fetched_at
                     FROM page_cache WHERE url = ?1",
                    params![url],
                    |row| {
                        let fetched_str: String = row.get(4)?;
                        Ok(CachedPage {
                            url: row.get(0)?,
                            content: row.get(1)?,
                            content_type: row.get(2)?,
                            status: row.get::<_, i64>(3)? as u16,
                            fetched_at: fetched_str
                                .parse::<DateTime<Utc>>()
                                .unwrap_or_else(|_| Utc::now()),
                        })
                    },
                )
                .optional()?;
            Ok(page)
        })
    }

    // ===== Statistics =====

    /// Row counts across the store
    pub fn counts(&self) -> StorageResult<StoreCounts> {
        self.with_retry(|conn| {
            let visited: i64 =
                conn.query_row("SELECT COUNT(*) FROM visited_urls", [], |row| row.get(0))?;
            let frontier: i64 =
                conn.query_row("SELECT COUNT(*) FROM frontier", [], |row| row.get(0))?;
            let robots_domains: i64 =
                conn.query_row("SELECT COUNT(*) FROM robots_meta", [], |row| row.get(0))?;
            let cached_pages: i64 =
                conn.query_row("SELECT COUNT(*) FROM page_cache", [], |row| row.get(0))?;
            Ok(StoreCounts {
                visited: visited as u64,
                frontier: frontier as u64,
                robots_domains: robots_domains as u64,
                cached_pages: cached_pages as u64,
            })
        })
    }
}

/// True for error codes worth retrying
fn is_transient(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == ErrorCode::DatabaseBusy || err.code == ErrorCode::DatabaseLocked
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(pool_size: usize) -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&dir.path().join("test.db"), pool_size).unwrap();
        (dir, store)
    }

    fn record(url: &str, priority: i64) -> FrontierRecord {
        FrontierRecord {
            url: url.to_string(),
            priority,
            depth: 0,
            parent: None,
        }
    }

    #[test]
    fn test_push_and_pop() {
        let (_dir, store) = open_store(1);
        assert!(store.frontier_push(&record("https://a.com/", 1), false).unwrap());
        let popped = store.frontier_pop().unwrap().unwrap();
        assert_eq!(popped.url, "https://a.com/");
        assert!(store.frontier_pop().unwrap().is_none());
    }

    #[test]
    fn test_push_duplicate_is_noop() {
        let (_dir, store) = open_store(1);
        assert!(store.frontier_push(&record("https://a.com/", 1), false).unwrap());
        assert!(!store.frontier_push(&record("https://a.com/", 5), false).unwrap());
        assert_eq!(store.frontier_len().unwrap(), 1);
    }

    #[test]
    fn test_push_visited_is_noop() {
        let (_dir, store) = open_store(1);
        store
            .mark_visited_bulk(&["https://a.com/".to_string()])
            .unwrap();
        assert!(!store.frontier_push(&record("https://a.com/", 1), false).unwrap());
        assert_eq!(store.frontier_len().unwrap(), 0);
    }

    #[test]
    fn test_pop_order_priority_then_fifo() {
        let (_dir, store) = open_store(1);
        store.frontier_push(&record("https://a.com/", 1), false).unwrap();
        store.frontier_push(&record("https://b.com/", 5), false).unwrap();
        store.frontier_push(&record("https://c.com/", 1), false).unwrap();

        assert_eq!(store.frontier_pop().unwrap().unwrap().url, "https://a.com/");
        assert_eq!(store.frontier_pop().unwrap().unwrap().url, "https://c.com/");
        assert_eq!(store.frontier_pop().unwrap().unwrap().url, "https://b.com/");
    }

    #[test]
    fn test_mark_visited_removes_from_frontier() {
        let (_dir, store) = open_store(1);
        store.frontier_push(&record("https://a.com/", 1), false).unwrap();
        store
            .mark_visited_bulk(&["https://a.com/".to_string()])
            .unwrap();
        assert!(store.is_visited("https://a.com/").unwrap());
        assert_eq!(store.frontier_len().unwrap(), 0);
    }

    #[test]
    fn test_clear_crawl_state() {
        let (_dir, store) = open_store(1);
        store.frontier_push(&record("https://a.com/", 1), false).unwrap();
        store
            .mark_visited_bulk(&["https://b.com/".to_string()])
            .unwrap();
        store.clear_crawl_state().unwrap();
        assert_eq!(store.frontier_len().unwrap(), 0);
        assert!(!store.is_visited("https://b.com/").unwrap());
    }

    #[test]
    fn test_robots_round_trip() {
        let (_dir, store) = open_store(1);
        let rec = RobotsRecord {
            allow: vec!["/public/docs".to_string(), "/public".to_string()],
            disallow: vec!["/private".to_string()],
            crawl_delay: Some(2.5),
            fetched_at: Utc::now(),
        };
        store.save_robots("example.com", &rec).unwrap();

        let loaded = store.load_robots("example.com").unwrap().unwrap();
        assert_eq!(loaded.allow, rec.allow);
        assert_eq!(loaded.disallow, rec.disallow);
        assert_eq!(loaded.crawl_delay, Some(2.5));
    }

    #[test]
    fn test_save_robots_replaces_wholesale() {
        let (_dir, store) = open_store(1);
        let first = RobotsRecord {
            allow: vec!["/a".to_string()],
            disallow: vec!["/b".to_string()],
            crawl_delay: None,
            fetched_at: Utc::now(),
        };
        store.save_robots("example.com", &first).unwrap();

        let second = RobotsRecord {
            allow: vec![],
            disallow: vec!["/c".to_string()],
            crawl_delay: Some(1.0),
            fetched_at: Utc::now(),
        };
        store.save_robots("example.com", &second).unwrap();

        let loaded = store.load_robots("example.com").unwrap().unwrap();
        assert!(loaded.allow.is_empty());
        assert_eq!(loaded.disallow, vec!["/c".to_string()]);
    }

    #[test]
    fn test_load_robots_missing_domain() {
        let (_dir, store) = open_store(1);
        assert!(store.load_robots("nowhere.example").unwrap().is_none());
    }

    #[test]
    fn test_page_cache_round_trip() {
        let (_dir, store) = open_store(1);
        let page = CachedPage {
            url: "https://a.com/".to_string(),
            content: b"<html></html>".to_vec(),
            content_type: Some("text/html".to_string()),
            status: 200,
            fetched_at: Utc::now(),
        };
        store.cache_page(&page).unwrap();

        let loaded = store.get_cached_page("https://a.com/").unwrap().unwrap();
        assert_eq!(loaded.content, page.content);
        assert_eq!(loaded.status, 200);
        assert_eq!(loaded.content_type, Some("text/html".to_string()));
    }

    #[test]
    fn test_counts() {
        let (_dir, store) = open_store(2);
        store.frontier_push(&record("https://a.com/", 1), false).unwrap();
        store
            .mark_visited_bulk(&["https://b.com/".to_string()])
            .unwrap();
        let counts = store.counts().unwrap();
        assert_eq!(counts.frontier, 1);
        assert_eq!(counts.visited, 1);
    }

    #[test]
    fn test_concurrent_push_dedup() {
        let (_dir, store) = open_store(4);
        let store = std::sync::Arc::new(store);
        let added = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = std::sync::Arc::clone(&store);
            let added = std::sync::Arc::clone(&added);
            handles.push(std::thread::spawn(move || {
                if store.frontier_push(&record("https://a.com/", 1), false).unwrap() {
                    added.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(added.load(Ordering::SeqCst), 1);
        assert_eq!(store.frontier_len().unwrap(), 1);
    }
}
