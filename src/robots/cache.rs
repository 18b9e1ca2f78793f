//! Robots rule cache
//!
//! Rule sets are cached in memory and persisted to the store with a 24 h
//! TTL. A per-domain entry lock makes sure only one worker fetches a
//! given domain's robots.txt at a time; a failed fetch caches nothing and
//! later permission checks fail open.

use crate::crawler::fetcher::Fetcher;
use crate::robots::rules::RuleSet;
use crate::storage::{SqliteStore, StorageResult};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use url::Url;

#[derive(Default)]
struct DomainEntry {
    rules: Option<RuleSet>,
}

/// Per-domain robots.txt cache over the persistent store
pub struct RobotsCache {
    store: Arc<SqliteStore>,
    fetcher: Arc<dyn Fetcher>,
    domains: Mutex<HashMap<String, Arc<Mutex<DomainEntry>>>>,
}

impl RobotsCache {
    pub fn new(store: Arc<SqliteStore>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            store,
            fetcher,
            domains: Mutex::new(HashMap::new()),
        }
    }

    fn entry(&self, domain: &str) -> Arc<Mutex<DomainEntry>> {
        let mut domains = self.domains.lock().unwrap();
        Arc::clone(domains.entry(domain.to_string()).or_default())
    }

    /// Makes sure a fresh rule set exists for the domain
    ///
    /// Checks the in-memory cache, then the store, then fetches
    /// `{scheme}://{domain}/robots.txt`. A fetch failure or non-2xx
    /// response leaves the domain without rules, which later permission
    /// checks treat as allow-everything.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(delay))` - Rules are cached and declare a crawl delay
    /// * `Ok(None)` - Rules are cached without a delay, or unavailable
    /// * `Err(StorageError)` - The store failed
    pub fn ensure_fetched(&self, domain: &str, scheme: &str) -> StorageResult<Option<f64>> {
        let entry = self.entry(domain);
        let mut guard = entry.lock().unwrap();

        if let Some(rules) = &guard.rules {
            if !rules.is_expired(Utc::now()) {
                return Ok(rules.crawl_delay);
            }
        }

        if let Some(record) = self.store.load_robots(domain)? {
            let rules = RuleSet::from_record(record);
            if !rules.is_expired(Utc::now()) {
                let delay = rules.crawl_delay;
                guard.rules = Some(rules);
                return Ok(delay);
            }
        }

        let robots_url = format!("{}://{}/robots.txt", scheme, domain);
        let parsed = match Url::parse(&robots_url) {
            Ok(u) => u,
            Err(e) => {
                warn!(domain, error = %e, "cannot build robots.txt URL, crawling permissively");
                return Ok(None);
            }
        };

        match self.fetcher.fetch(&parsed) {
            Ok(response) if (200..300).contains(&response.status) => {
                let content = String::from_utf8_lossy(&response.body);
                let rules = RuleSet::parse(&content, Utc::now());
                debug!(
                    domain,
                    allow = rules.allow.len(),
                    disallow = rules.disallow.len(),
                    crawl_delay = ?rules.crawl_delay,
                    "cached robots.txt rules"
                );
                self.store.save_robots(domain, &rules.to_record())?;
                let delay = rules.crawl_delay;
                guard.rules = Some(rules);
                Ok(delay)
            }
            Ok(response) => {
                debug!(
                    domain,
                    status = response.status,
                    "no usable robots.txt, crawling permissively"
                );
                Ok(None)
            }
            Err(e) => {
                warn!(domain, error = %e, "robots.txt fetch failed, crawling permissively");
                Ok(None)
            }
        }
    }

    /// Checks whether a path on a domain may be crawled
    ///
    /// A domain without cached rules is fully allowed; callers decide
    /// whether to `ensure_fetched` first.
    pub fn is_allowed(&self, domain: &str, path: &str) -> bool {
        let entry = self.entry(domain);
        let guard = entry.lock().unwrap();
        match &guard.rules {
            Some(rules) => rules.is_allowed(path),
            None => true,
        }
    }
}
