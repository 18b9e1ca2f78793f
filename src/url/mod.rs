//! URL utilities
//!
//! Domain extraction for the politeness engine. The domain key includes a
//! non-default port so two servers on the same host are rate limited
//! independently.

use crate::{CrawlError, Result};
use url::Url;

/// Extracts the domain key for a URL
///
/// The key is the lowercase host, with `:port` appended when the URL
/// carries an explicit non-default port. Both the rate limiter and the
/// robots cache use this key.
///
/// # Arguments
///
/// * `url` - A parsed URL
///
/// # Returns
///
/// * `Ok(String)` - The domain key
/// * `Err(CrawlError::InvalidUrl)` - The URL has no host
pub fn extract_domain(url: &Url) -> Result<String> {
    let host = url.host_str().ok_or_else(|| CrawlError::InvalidUrl {
        url: url.to_string(),
        message: "URL has no host".to_string(),
    })?;
    let host = host.to_ascii_lowercase();
    match url.port() {
        Some(port) => Ok(format!("{}:{}", host, port)),
        None => Ok(host),
    }
}

/// Returns true if the URL uses a scheme the crawler fetches
pub fn is_crawlable_scheme(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}
