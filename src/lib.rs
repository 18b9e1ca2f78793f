//! Tsumugi: a polite, concurrent web crawler
//!
//! This crate implements the crawl-scheduling core of a web crawler: a
//! bounded pool of worker threads, a durable URL frontier with atomic
//! dedup, and a politeness engine combining a per-domain adaptive rate
//! limiter with a robots.txt rule cache.

pub mod config;
pub mod crawler;
pub mod frontier;
pub mod limiter;
pub mod pool;
pub mod robots;
pub mod stats;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for crawler operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] pool::PoolError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for crawler operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::Crawler;
pub use frontier::{Frontier, UrlTask};
pub use limiter::RateLimiter;
pub use robots::RobotsCache;
pub use storage::SqliteStore;
