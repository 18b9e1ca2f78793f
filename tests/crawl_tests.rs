//! End-to-end crawl tests against a local mock server

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tsumugi::config::Config;
use tsumugi::url::extract_domain;
use tsumugi::{Crawler, SqliteStore};
use url::Url;

fn test_config() -> Config {
    let mut config = Config::default();
    config.crawler.workers = 2;
    config.crawler.queue_capacity = 32;
    config.crawler.max_depth = 2;
    config.crawler.max_pages = 20;
    config.crawler.user_agent = "tsumugi-test/0.1".to_string();
    config.politeness.min_delay_ms = 10;
    config
}

fn make_crawler(config: Config) -> (TempDir, Crawler) {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(
        SqliteStore::open(&dir.path().join("crawl.db"), config.connection_count()).unwrap(),
    );
    let crawler = Crawler::new(config, store).unwrap();
    (dir, crawler)
}

#[test]
fn seed_crawl_discovers_links() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("User-agent: *\nCrawl-delay: 0.05\n")
        .create();
    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(r#"<a href="/a">a</a><a href="/b">b</a><a href="/c">c</a>"#)
        .create();
    for path in ["/a", "/b", "/c"] {
        server
            .mock("GET", path)
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<p>leaf</p>")
            .create();
    }

    let (_dir, mut crawler) = make_crawler(test_config());
    let seed = format!("{}/", server.url());
    assert!(crawler.submit_seed(&seed, 0).unwrap());

    let stats = crawler.run().unwrap();
    crawler.shutdown();

    assert_eq!(stats.pages_fetched, 4);
    assert_eq!(stats.links_discovered, 3);
    assert_eq!(stats.fetch_errors, 0);

    let ctx = crawler.context();
    assert!(ctx.frontier.is_visited(&seed).unwrap());
    for path in ["/a", "/b", "/c"] {
        let url = format!("{}{}", server.url(), path);
        assert!(ctx.frontier.is_visited(&url).unwrap(), "{} not visited", url);
    }
    assert!(ctx.frontier.is_empty().unwrap());

    // The domain's rate state was stamped and picked up the crawl delay
    let domain = extract_domain(&Url::parse(&seed).unwrap()).unwrap();
    let state = ctx.limiter.snapshot(&domain).expect("domain was crawled");
    assert!(state.last_request().is_some());
    assert!(state.min_delay() >= Duration::from_millis(50));
}

#[test]
fn robots_disallow_is_respected() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("Disallow: /private*\n")
        .create();
    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(r#"<a href="/private/secret">s</a><a href="/ok">ok</a>"#)
        .create();
    server
        .mock("GET", "/ok")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<p>fine</p>")
        .create();
    let private = server
        .mock("GET", "/private/secret")
        .with_status(200)
        .with_body("should never be fetched")
        .expect(0)
        .create();

    let (_dir, mut crawler) = make_crawler(test_config());
    let seed = format!("{}/", server.url());
    crawler.submit_seed(&seed, 0).unwrap();

    let stats = crawler.run().unwrap();
    crawler.shutdown();

    assert_eq!(stats.pages_fetched, 2);
    assert_eq!(stats.skipped_disallowed, 1);
    private.assert();

    let ctx = crawler.context();
    let blocked = format!("{}/private/secret", server.url());
    assert!(!ctx.frontier.is_visited(&blocked).unwrap());
}

#[test]
fn error_responses_raise_the_domain_delay() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/robots.txt")
        .with_status(404)
        .create();
    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(r#"<a href="/e1">1</a><a href="/e2">2</a><a href="/e3">3</a>"#)
        .create();
    for path in ["/e1", "/e2", "/e3"] {
        server.mock("GET", path).with_status(503).create();
    }

    let (_dir, mut crawler) = make_crawler(test_config());
    let seed = format!("{}/", server.url());
    crawler.submit_seed(&seed, 0).unwrap();

    let stats = crawler.run().unwrap();
    crawler.shutdown();

    assert_eq!(stats.pages_fetched, 4);

    // Three 503s in a row trigger the error penalty
    let ctx = crawler.context();
    let domain = extract_domain(&Url::parse(&seed).unwrap()).unwrap();
    let state = ctx.limiter.snapshot(&domain).expect("domain was crawled");
    assert!(state.current_delay() >= Duration::from_millis(20));
}

#[test]
fn rerun_skips_visited_pages() {
    let mut server = mockito::Server::new();
    server.mock("GET", "/robots.txt").with_status(404).create();
    let page = server
        .mock("GET", "/once")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<p>page</p>")
        .expect(1)
        .create();

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("crawl.db");
    let seed = format!("{}/once", server.url());

    for run in 0..2 {
        let config = test_config();
        let store = Arc::new(SqliteStore::open(&db, config.connection_count()).unwrap());
        let mut crawler = Crawler::new(config, store).unwrap();
        let added = crawler.submit_seed(&seed, 0).unwrap();
        assert_eq!(added, run == 0);
        crawler.run().unwrap();
        crawler.shutdown();
    }

    page.assert();
}
