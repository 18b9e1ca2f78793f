//! Link extraction
//!
//! Pulls `a[href]` links out of fetched HTML and resolves them against
//! the page URL. Behind a trait so tests can substitute a canned
//! extractor.

use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Abstraction over HTML link discovery
pub trait LinkExtractor: Send + Sync {
    /// Returns absolute http(s) URLs found in the document, fragment
    /// stripped, deduplicated in document order
    fn extract_links(&self, html: &str, base: &Url) -> Vec<Url>;
}

/// Default extractor built on the `scraper` crate
pub struct HtmlLinkExtractor {
    anchor_selector: Selector,
}

impl HtmlLinkExtractor {
    pub fn new() -> Self {
        Self {
            // The selector is a literal, parse cannot fail
            anchor_selector: Selector::parse("a[href]").unwrap(),
        }
    }
}

impl Default for HtmlLinkExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkExtractor for HtmlLinkExtractor {
    fn extract_links(&self, html: &str, base: &Url) -> Vec<Url> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for element in document.select(&self.anchor_selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let href = href.trim();
            if href.is_empty() {
                continue;
            }
            let Ok(mut resolved) = base.join(href) else {
                continue;
            };
            if !matches!(resolved.scheme(), "http" | "https") {
                continue;
            }
            resolved.set_fragment(None);
            if seen.insert(resolved.to_string()) {
                links.push(resolved);
            }
        }

        links
    }
}
