//! HTTP fetching
//!
//! The `Fetcher` trait is the seam between the crawl logic and the
//! network; the default implementation wraps a blocking reqwest client.
//! Responses with error statuses are still `Ok`: the rate limiter needs
//! the status code, so only transport-level failures are errors.

use reqwest::blocking::Client;
use std::io::Read;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Largest response body the crawler will read
pub const MAX_RESPONSE_SIZE: usize = 1024 * 1024;

/// Fetch failures at the transport level
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("failed to read response body: {0}")]
    Read(String),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// A completed HTTP response
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// URL after redirects
    pub final_url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// Wall time from request start to body fully read
    pub response_time: Duration,
}

/// Abstraction over HTTP transport
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &Url) -> Result<FetchResponse, FetchError>;
}

/// Builds the blocking HTTP client used by the default fetcher
///
/// # Arguments
///
/// * `user_agent` - User agent string to send with every request
/// * `timeout` - Overall request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.to_string())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Default fetcher over a blocking reqwest client
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(user_agent, timeout)?,
        })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> Result<FetchResponse, FetchError> {
        let start = Instant::now();
        let response = self.client.get(url.clone()).send().map_err(classify)?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        // Read at most the cap plus one byte so truncation is detectable
        let mut body = Vec::new();
        let mut limited = response.take(MAX_RESPONSE_SIZE as u64 + 1);
        limited
            .read_to_end(&mut body)
            .map_err(|e| FetchError::Read(e.to_string()))?;
        if body.len() > MAX_RESPONSE_SIZE {
            debug!(%url, "response exceeds size cap, truncating");
            body.truncate(MAX_RESPONSE_SIZE);
        }

        Ok(FetchResponse {
            final_url,
            status,
            content_type,
            body,
            response_time: start.elapsed(),
        })
    }
}

fn classify(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::Connect(e.to_string())
    } else {
        FetchError::Transport(e)
    }
}
