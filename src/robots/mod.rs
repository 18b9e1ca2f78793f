//! robots.txt handling
//!
//! `rules` parses and matches rule sets; `cache` keeps them per domain,
//! in memory and in the store.

pub mod cache;
pub mod rules;

pub use cache::RobotsCache;
pub use rules::RuleSet;
