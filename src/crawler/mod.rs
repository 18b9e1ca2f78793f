//! Crawl engine
//!
//! `coordinator` drives the crawl, `fetcher` talks HTTP, and `extractor`
//! discovers links.

pub mod coordinator;
pub mod extractor;
pub mod fetcher;

pub use coordinator::{CrawlContext, Crawler};
pub use extractor::{HtmlLinkExtractor, LinkExtractor};
pub use fetcher::{build_http_client, FetchError, FetchResponse, Fetcher, HttpFetcher};
