//! Tsumugi main entry point
//!
//! Command-line interface for the tsumugi web crawler.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tsumugi::config::{load_config_with_hash, Config};
use tsumugi::{Crawler, SqliteStore};

/// Tsumugi: a polite, concurrent web crawler
///
/// Crawls from a seed URL while honoring robots.txt and adapting its
/// per-domain request rate to how each server responds.
#[derive(Parser, Debug)]
#[command(name = "tsumugi")]
#[command(version)]
#[command(about = "A polite, concurrent web crawler", long_about = None)]
struct Cli {
    /// Seed URL to start crawling from
    #[arg(value_name = "URL", required_unless_present = "stats")]
    seed: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum crawl depth from the seed
    #[arg(short, long)]
    depth: Option<u32>,

    /// Maximum number of pages to crawl
    #[arg(short, long)]
    pages: Option<u64>,

    /// Number of worker threads
    #[arg(short, long)]
    workers: Option<usize>,

    /// Re-crawl URLs that were already visited
    #[arg(short, long)]
    force: bool,

    /// Ignore robots.txt rules
    #[arg(long)]
    no_robots: bool,

    /// Clear the frontier and visited set before crawling
    #[arg(long)]
    fresh: bool,

    /// Show statistics from the database and exit
    #[arg(long)]
    stats: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = load_configuration(&cli)?;

    if cli.stats {
        return handle_stats(&config);
    }

    match cli.seed.as_deref() {
        Some(seed) => handle_crawl(config, seed, cli.fresh),
        None => anyhow::bail!("a seed URL is required"),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("tsumugi=info,warn"),
            1 => EnvFilter::new("tsumugi=debug,info"),
            2 => EnvFilter::new("tsumugi=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the config file (defaults when absent) and applies CLI overrides
fn load_configuration(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    if let Some(depth) = cli.depth {
        config.crawler.max_depth = depth;
    }
    if let Some(pages) = cli.pages {
        config.crawler.max_pages = pages;
    }
    if let Some(workers) = cli.workers {
        config.crawler.workers = workers;
    }
    if cli.force {
        config.crawler.force_rescrape = true;
    }
    if cli.no_robots {
        config.crawler.respect_robots = false;
    }

    tsumugi::config::validate(&config)?;
    Ok(config)
}

/// Handles the --stats mode: shows row counts from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let store = SqliteStore::open(Path::new(&config.storage.database_path), 1)
        .with_context(|| format!("failed to open {}", config.storage.database_path))?;
    let counts = store.counts()?;

    println!("Database: {}", config.storage.database_path);
    println!("  Visited URLs:     {}", counts.visited);
    println!("  Frontier entries: {}", counts.frontier);
    println!("  Robots domains:   {}", counts.robots_domains);
    println!("  Cached pages:     {}", counts.cached_pages);
    Ok(())
}

/// Runs the crawl from a seed URL
fn handle_crawl(config: Config, seed: &str, fresh: bool) -> anyhow::Result<()> {
    let store = Arc::new(
        SqliteStore::open(
            Path::new(&config.storage.database_path),
            config.connection_count(),
        )
        .with_context(|| format!("failed to open {}", config.storage.database_path))?,
    );

    if fresh {
        tracing::info!("Starting fresh crawl (clearing previous state)");
        store.clear_crawl_state()?;
    }

    tracing::info!(
        "Crawling from {} (depth {}, up to {} pages, {} workers)",
        seed,
        config.crawler.max_depth,
        config.crawler.max_pages,
        config.crawler.workers
    );

    let mut crawler = Crawler::new(config, store)?;
    if !crawler.submit_seed(seed, 0)? {
        tracing::warn!("Seed URL was already visited; use --force or --fresh to re-crawl");
    }

    let result = crawler.run();
    crawler.shutdown();

    match result {
        Ok(stats) => {
            tracing::info!(
                "Crawl completed: {} pages fetched, {} links discovered",
                stats.pages_fetched,
                stats.links_discovered
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
