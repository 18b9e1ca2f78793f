//! Crawl statistics
//!
//! Lock-free counters bumped from worker threads, snapshotted by the
//! dispatch loop for progress logs and the final summary.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Shared crawl counters
#[derive(Debug, Default)]
pub struct CrawlStats {
    pub pages_fetched: AtomicU64,
    pub bytes_fetched: AtomicU64,
    pub links_discovered: AtomicU64,
    pub links_deduped: AtomicU64,
    pub skipped_visited: AtomicU64,
    pub skipped_disallowed: AtomicU64,
    pub fetch_errors: AtomicU64,
    pub store_errors: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub pages_fetched: u64,
    pub bytes_fetched: u64,
    pub links_discovered: u64,
    pub links_deduped: u64,
    pub skipped_visited: u64,
    pub skipped_disallowed: u64,
    pub fetch_errors: u64,
    pub store_errors: u64,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
            links_discovered: self.links_discovered.load(Ordering::Relaxed),
            links_deduped: self.links_deduped.load(Ordering::Relaxed),
            skipped_visited: self.skipped_visited.load(Ordering::Relaxed),
            skipped_disallowed: self.skipped_disallowed.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }

    /// Logs the end-of-run summary
    pub fn log_summary(&self) {
        let s = self.snapshot();
        info!(
            pages = s.pages_fetched,
            bytes = s.bytes_fetched,
            links_discovered = s.links_discovered,
            links_deduped = s.links_deduped,
            skipped_visited = s.skipped_visited,
            skipped_disallowed = s.skipped_disallowed,
            fetch_errors = s.fetch_errors,
            store_errors = s.store_errors,
            "crawl finished"
        );
    }
}

/// Bumps a counter by one
pub fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Adds an amount to a counter
pub fn add(counter: &AtomicU64, amount: u64) {
    counter.fetch_add(amount, Ordering::Relaxed);
}
