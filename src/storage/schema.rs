//! Database schema definitions
//!
//! All SQL schema definitions for the crawler database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- URLs that have been crawled (or skipped past the point of re-crawling)
CREATE TABLE IF NOT EXISTS visited_urls (
    url TEXT PRIMARY KEY,
    visited_at TEXT NOT NULL
);

-- Pending crawl queue; id provides the FIFO tie-break within a priority
CREATE TABLE IF NOT EXISTS frontier (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    priority INTEGER NOT NULL DEFAULT 0,
    depth INTEGER NOT NULL DEFAULT 0,
    parent_url TEXT
);

CREATE INDEX IF NOT EXISTS idx_frontier_priority ON frontier(priority, id);

-- Ordered robots.txt rules per domain
CREATE TABLE IF NOT EXISTS robots_rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('allow', 'disallow')),
    rule TEXT NOT NULL,
    position INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_robots_rules_domain ON robots_rules(domain, kind, position);

-- Per-domain robots metadata
CREATE TABLE IF NOT EXISTS robots_meta (
    domain TEXT PRIMARY KEY,
    fetched_at TEXT NOT NULL,
    crawl_delay REAL
);

-- Fetched page content
CREATE TABLE IF NOT EXISTS page_cache (
    url TEXT PRIMARY KEY,
    content BLOB NOT NULL,
    content_type TEXT,
    status INTEGER NOT NULL,
    content_length INTEGER NOT NULL,
    fetched_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
