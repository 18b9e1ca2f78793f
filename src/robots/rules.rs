//! robots.txt parsing and path matching
//!
//! Rules are normalized and sorted at parse time so lookups can take the
//! first match in each list as the most specific one.

use crate::storage::RobotsRecord;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// How long a fetched rule set stays fresh
pub const RULE_TTL_SECS: i64 = 86400;

/// Parsed robots.txt rules for one domain
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    /// Allow rules, longest first then lexicographic
    pub allow: Vec<String>,
    /// Disallow rules, same order
    pub disallow: Vec<String>,
    pub crawl_delay: Option<f64>,
    pub fetched_at: DateTime<Utc>,
}

impl RuleSet {
    /// Parses robots.txt content
    ///
    /// `Allow:`, `Disallow:` and `Crawl-delay:` lines are honored
    /// regardless of user-agent grouping; when several crawl delays
    /// appear the largest wins. Rule paths are normalized and each list
    /// is sorted by descending length, ties lexicographic.
    pub fn parse(content: &str, fetched_at: DateTime<Utc>) -> Self {
        let mut allow = Vec::new();
        let mut disallow = Vec::new();
        let mut crawl_delay: Option<f64> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "allow" if !value.is_empty() => allow.push(normalize_path(value)),
                "disallow" if !value.is_empty() => disallow.push(normalize_path(value)),
                "crawl-delay" => {
                    if let Ok(d) = value.parse::<f64>() {
                        if d.is_finite() && d > 0.0 {
                            crawl_delay = Some(crawl_delay.map_or(d, |c| c.max(d)));
                        }
                    }
                }
                _ => {}
            }
        }

        sort_rules(&mut allow);
        sort_rules(&mut disallow);

        Self {
            allow,
            disallow,
            crawl_delay,
            fetched_at,
        }
    }

    /// Decides whether a path may be crawled
    ///
    /// The most specific (longest) matching rule across both lists wins;
    /// an equal-length tie goes to disallow. A path matching no rule is
    /// allowed.
    pub fn is_allowed(&self, path: &str) -> bool {
        let path = normalize_path(path);
        // Lists are sorted longest-first, so the first hit is the most
        // specific match in that list
        let allow = self.allow.iter().find(|r| path_matches(&path, r));
        let disallow = self.disallow.iter().find(|r| path_matches(&path, r));
        match (allow, disallow) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(d)) => a.len() > d.len(),
        }
    }

    /// True once the rule set has outlived its TTL
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.fetched_at >= ChronoDuration::seconds(RULE_TTL_SECS)
    }

    pub fn to_record(&self) -> RobotsRecord {
        RobotsRecord {
            allow: self.allow.clone(),
            disallow: self.disallow.clone(),
            crawl_delay: self.crawl_delay,
            fetched_at: self.fetched_at,
        }
    }

    pub fn from_record(record: RobotsRecord) -> Self {
        Self {
            allow: record.allow,
            disallow: record.disallow,
            crawl_delay: record.crawl_delay,
            fetched_at: record.fetched_at,
        }
    }
}

/// Normalizes a rule or request path
///
/// Drops the query string and fragment, strips trailing slashes, and maps
/// an empty result back to the root.
pub fn normalize_path(path: &str) -> String {
    let mut p = path;
    if let Some(i) = p.find(['?', '#']) {
        p = &p[..i];
    }
    let trimmed = p.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn sort_rules(rules: &mut [String]) {
    rules.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
}

/// Tests a normalized path against a single rule
///
/// The rule's first `*` splits it into a prefix and a remainder:
/// `prefix*` matches any path starting with the prefix, `*suffix` any
/// path ending with the suffix, and `a*b` any path starting with `a`
/// whose remainder contains `b`. A rule without `*` matches only the
/// exact path.
pub fn path_matches(path: &str, rule: &str) -> bool {
    match rule.find('*') {
        None => path == rule,
        Some(idx) => {
            let prefix = &rule[..idx];
            let rest = &rule[idx + 1..];
            if rest.is_empty() {
                path.starts_with(prefix)
            } else if prefix.is_empty() {
                path.ends_with(rest)
            } else {
                path.starts_with(prefix) && path[prefix.len()..].contains(rest)
            }
        }
    }
}
