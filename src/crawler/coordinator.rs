//! Crawl coordination
//!
//! The `Crawler` owns the worker pool and a shared context of
//! collaborators. The dispatch loop moves tasks from the frontier onto
//! the pool; each worker runs one `crawl_cycle` per task: visited check,
//! courtesy wait, robots check, fetch, cache, mark visited, and child
//! discovery.

use crate::config::Config;
use crate::crawler::extractor::{HtmlLinkExtractor, LinkExtractor};
use crate::crawler::fetcher::{Fetcher, HttpFetcher};
use crate::frontier::{Frontier, UrlTask};
use crate::limiter::RateLimiter;
use crate::pool::WorkerPool;
use crate::robots::RobotsCache;
use crate::stats::{self, CrawlStats, StatsSnapshot};
use crate::storage::{CachedPage, SqliteStore};
use crate::url::{extract_domain, is_crawlable_scheme};
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// How long the dispatch loop sleeps when the frontier is empty but
/// workers are still running
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Dispatched pages between progress log lines
const PROGRESS_INTERVAL: u64 = 10;

/// Everything a worker needs to run one crawl cycle
pub struct CrawlContext {
    pub config: Arc<Config>,
    pub store: Arc<SqliteStore>,
    pub frontier: Frontier,
    pub limiter: RateLimiter,
    pub robots: RobotsCache,
    pub fetcher: Arc<dyn Fetcher>,
    pub extractor: Arc<dyn LinkExtractor>,
    pub stats: CrawlStats,
}

/// Main crawler: worker pool plus shared context
pub struct Crawler {
    pool: WorkerPool,
    ctx: Arc<CrawlContext>,
}

impl Crawler {
    /// Creates a crawler with the default HTTP fetcher and HTML extractor
    pub fn new(config: Config, store: Arc<SqliteStore>) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(
            &config.crawler.user_agent,
            Duration::from_secs(config.crawler.request_timeout_secs),
        )?);
        let extractor = Arc::new(HtmlLinkExtractor::new());
        Self::with_collaborators(config, store, fetcher, extractor)
    }

    /// Creates a crawler with injected fetcher and extractor
    pub fn with_collaborators(
        config: Config,
        store: Arc<SqliteStore>,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn LinkExtractor>,
    ) -> Result<Self> {
        let pool = WorkerPool::new(config.crawler.workers, config.crawler.queue_capacity)?;
        let floor = Duration::from_millis(config.politeness.min_delay_ms);
        let ctx = Arc::new(CrawlContext {
            frontier: Frontier::new(Arc::clone(&store), config.crawler.force_rescrape),
            limiter: RateLimiter::new(floor),
            robots: RobotsCache::new(Arc::clone(&store), Arc::clone(&fetcher)),
            config: Arc::new(config),
            store,
            fetcher,
            extractor,
            stats: CrawlStats::new(),
        });
        Ok(Self { pool, ctx })
    }

    /// Shared context, for inspection after a run
    pub fn context(&self) -> &Arc<CrawlContext> {
        &self.ctx
    }

    /// Enqueues a seed URL at the given priority
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The seed was added to the frontier
    /// * `Ok(false)` - The URL was already visited or queued
    pub fn submit_seed(&self, url: &str, priority: i64) -> Result<bool> {
        // Parse up front so a bad seed fails loudly instead of in a worker
        let parsed = Url::parse(url)?;
        self.ctx
            .frontier
            .enqueue(&UrlTask::seed(parsed.as_str(), priority))
    }

    /// Runs the crawl to completion
    ///
    /// Dispatches frontier tasks onto the pool until the page limit is
    /// spent or the frontier and the pool are both idle, then drains the
    /// pool.
    pub fn run(&self) -> Result<StatsSnapshot> {
        let max_pages = self.ctx.config.crawler.max_pages;
        let mut dispatched: u64 = 0;

        loop {
            if dispatched >= max_pages {
                info!(dispatched, "page limit reached");
                break;
            }
            match self.ctx.frontier.dequeue()? {
                Some(task) => {
                    let ctx = Arc::clone(&self.ctx);
                    self.pool.submit(move || crawl_cycle(&ctx, task))?;
                    dispatched += 1;
                    if dispatched % PROGRESS_INTERVAL == 0 {
                        let s = self.ctx.stats.snapshot();
                        info!(
                            dispatched,
                            fetched = s.pages_fetched,
                            discovered = s.links_discovered,
                            errors = s.fetch_errors,
                            queue = self.pool.queue_depth(),
                            "crawl progress"
                        );
                    }
                }
                None => {
                    // A worker can still commit a discovery after the empty
                    // dequeue above. Observe the pool idle first; nothing can
                    // enqueue after that, so an empty frontier seen afterwards
                    // is conclusive.
                    if self.pool.is_idle() {
                        if self.ctx.frontier.is_empty()? {
                            break;
                        }
                    } else {
                        std::thread::sleep(IDLE_POLL_INTERVAL);
                    }
                }
            }
        }

        self.pool.wait();
        self.ctx.stats.log_summary();
        Ok(self.ctx.stats.snapshot())
    }

    /// Shuts down the worker pool
    pub fn shutdown(&mut self) {
        self.pool.shutdown();
    }
}

/// Processes one frontier task end to end
///
/// Failures are logged and counted; a worker never brings the pool down.
pub(crate) fn crawl_cycle(ctx: &CrawlContext, task: UrlTask) {
    if !ctx.config.crawler.force_rescrape {
        match ctx.frontier.is_visited(&task.url) {
            Ok(true) => {
                stats::bump(&ctx.stats.skipped_visited);
                debug!(url = %task.url, "already visited, skipping");
                return;
            }
            Ok(false) => {}
            Err(e) => {
                stats::bump(&ctx.stats.store_errors);
                warn!(url = %task.url, error = %e, "visited lookup failed, skipping");
                return;
            }
        }
    }

    let url = match Url::parse(&task.url) {
        Ok(u) => u,
        Err(e) => {
            warn!(url = %task.url, error = %e, "unparseable URL, skipping");
            return;
        }
    };
    if !is_crawlable_scheme(&url) {
        debug!(url = %task.url, scheme = url.scheme(), "unsupported scheme, skipping");
        return;
    }
    let domain = match extract_domain(&url) {
        Ok(d) => d,
        Err(e) => {
            warn!(url = %task.url, error = %e, "no domain, skipping");
            return;
        }
    };

    ctx.limiter.wait(&domain);

    if ctx.config.crawler.respect_robots {
        match ctx.robots.ensure_fetched(&domain, url.scheme()) {
            Ok(Some(delay)) => ctx.limiter.set_crawl_delay(&domain, delay),
            Ok(None) => {}
            Err(e) => {
                stats::bump(&ctx.stats.store_errors);
                warn!(domain = %domain, error = %e, "robots lookup failed");
            }
        }
        if !ctx.robots.is_allowed(&domain, url.path()) {
            stats::bump(&ctx.stats.skipped_disallowed);
            info!(url = %task.url, "disallowed by robots.txt, skipping");
            return;
        }
    }

    let response = match ctx.fetcher.fetch(&url) {
        Ok(r) => r,
        Err(e) => {
            stats::bump(&ctx.stats.fetch_errors);
            warn!(url = %task.url, error = %e, "fetch failed");
            return;
        }
    };

    ctx.limiter.update(&domain, response.response_time, response.status);

    let page = CachedPage {
        url: task.url.clone(),
        content: response.body.clone(),
        content_type: response.content_type.clone(),
        status: response.status,
        fetched_at: Utc::now(),
    };
    if let Err(e) = ctx.store.cache_page(&page) {
        stats::bump(&ctx.stats.store_errors);
        warn!(url = %task.url, error = %e, "failed to cache page");
    }

    if let Err(e) = ctx.frontier.mark_visited_bulk(&[task.url.clone()]) {
        stats::bump(&ctx.stats.store_errors);
        warn!(url = %task.url, error = %e, "failed to mark visited");
        return;
    }

    stats::bump(&ctx.stats.pages_fetched);
    stats::add(&ctx.stats.bytes_fetched, response.body.len() as u64);
    debug!(
        url = %task.url,
        status = response.status,
        bytes = response.body.len(),
        response_ms = response.response_time.as_millis() as u64,
        "fetched"
    );

    let is_html = response
        .content_type
        .as_deref()
        .map(|ct| ct.contains("text/html"))
        .unwrap_or(false);
    if !(200..300).contains(&response.status) || !is_html {
        return;
    }
    if task.depth >= ctx.config.crawler.max_depth {
        debug!(url = %task.url, depth = task.depth, "max depth reached");
        return;
    }

    let html = String::from_utf8_lossy(&response.body);
    for link in ctx.extractor.extract_links(&html, &response.final_url) {
        stats::bump(&ctx.stats.links_discovered);
        let child = UrlTask::child(link.as_str(), &task);
        match ctx.frontier.enqueue(&child) {
            Ok(true) => {}
            Ok(false) => stats::bump(&ctx.stats.links_deduped),
            Err(e) => {
                stats::bump(&ctx.stats.store_errors);
                warn!(url = %child.url, error = %e, "failed to enqueue link");
            }
        }
    }
}
