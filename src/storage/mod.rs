//! Persistent storage
//!
//! SQLite-backed store shared by the frontier, the robots cache, and the
//! page cache. A small pool of connections (one per worker by default)
//! replaces a single globally-locked handle.

pub mod schema;
pub mod sqlite;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use sqlite::SqliteStore;

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A pending entry in the crawl frontier
#[derive(Debug, Clone, PartialEq)]
pub struct FrontierRecord {
    pub url: String,
    /// Lower values are dequeued first
    pub priority: i64,
    pub depth: u32,
    pub parent: Option<String>,
}

/// Persisted robots.txt rules for one domain
#[derive(Debug, Clone)]
pub struct RobotsRecord {
    /// Allow rules in stored order (already sorted by specificity)
    pub allow: Vec<String>,
    /// Disallow rules in stored order
    pub disallow: Vec<String>,
    pub crawl_delay: Option<f64>,
    pub fetched_at: DateTime<Utc>,
}

/// A cached page body plus response metadata
#[derive(Debug, Clone)]
pub struct CachedPage {
    pub url: String,
    pub content: Vec<u8>,
    pub content_type: Option<String>,
    pub status: u16,
    pub fetched_at: DateTime<Utc>,
}

/// Row counts for the `--stats` report
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreCounts {
    pub visited: u64,
    pub frontier: u64,
    pub robots_domains: u64,
    pub cached_pages: u64,
}
