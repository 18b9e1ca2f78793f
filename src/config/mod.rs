//! Crawler configuration
//!
//! Configuration is loaded from a TOML file with kebab-case keys. Every
//! field has a default, so the crawler runs without a config file and the
//! CLI can override individual values.

use crate::{ConfigError, ConfigResult};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub politeness: PolitenessConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrawlerConfig {
    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the bounded task queue
    #[serde(rename = "queue-capacity", default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum depth to crawl from seed URLs
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Maximum number of pages to fetch in one run
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u64,

    /// Whether to honor robots.txt rules
    #[serde(rename = "respect-robots", default = "default_true")]
    pub respect_robots: bool,

    /// Re-fetch URLs that are already in the visited set
    #[serde(rename = "force-rescrape", default)]
    pub force_rescrape: bool,

    /// HTTP request timeout in seconds
    #[serde(rename = "request-timeout-secs", default = "default_timeout")]
    pub request_timeout_secs: u64,

    /// User agent string sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

/// Politeness engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolitenessConfig {
    /// Global floor for the per-domain delay, in milliseconds
    #[serde(rename = "min-delay-ms", default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,

    /// Size of the connection pool; 0 means one connection per worker
    #[serde(default)]
    pub connections: usize,
}

fn default_workers() -> usize {
    8
}
fn default_queue_capacity() -> usize {
    1000
}
fn default_max_depth() -> u32 {
    3
}
fn default_max_pages() -> u64 {
    1000
}
fn default_true() -> bool {
    true
}
fn default_timeout() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!("tsumugi/{}", env!("CARGO_PKG_VERSION"))
}
fn default_min_delay_ms() -> u64 {
    1000
}
fn default_database_path() -> String {
    "./tsumugi.db".to_string()
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            max_depth: default_max_depth(),
            max_pages: default_max_pages(),
            respect_robots: true,
            force_rescrape: false,
            request_timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            connections: 0,
        }
    }
}

impl Config {
    /// Number of store connections to open, derived from worker count when
    /// not set explicitly
    pub fn connection_count(&self) -> usize {
        if self.storage.connections > 0 {
            self.storage.connections
        } else {
            self.crawler.workers
        }
    }
}

/// Loads and validates a configuration file
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate
pub fn load_config(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Used to detect configuration changes between runs; the hash is logged
/// at startup.
pub fn compute_config_hash(path: &Path) -> ConfigResult<String> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> ConfigResult<(Config, String)> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Validates a configuration, returning the first problem found
pub fn validate(config: &Config) -> ConfigResult<()> {
    if config.crawler.workers == 0 {
        return Err(ConfigError::Validation(
            "crawler.workers must be at least 1".to_string(),
        ));
    }
    if config.crawler.queue_capacity == 0 {
        return Err(ConfigError::Validation(
            "crawler.queue-capacity must be at least 1".to_string(),
        ));
    }
    if config.crawler.max_pages == 0 {
        return Err(ConfigError::Validation(
            "crawler.max-pages must be at least 1".to_string(),
        ));
    }
    if config.crawler.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crawler.user-agent must not be empty".to_string(),
        ));
    }
    if config.crawler.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "crawler.request-timeout-secs must be at least 1".to_string(),
        ));
    }
    if config.storage.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "storage.database-path must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.crawler.workers, 8);
        assert_eq!(config.crawler.queue_capacity, 1000);
        assert_eq!(config.crawler.max_depth, 3);
        assert_eq!(config.crawler.max_pages, 1000);
        assert!(config.crawler.respect_robots);
        assert!(!config.crawler.force_rescrape);
        assert_eq!(config.politeness.min_delay_ms, 1000);
        assert_eq!(config.connection_count(), 8);
    }

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(
            r#"
[crawler]
workers = 4
queue-capacity = 64
max-depth = 2
max-pages = 50
respect-robots = false
user-agent = "TestBot/1.0"

[politeness]
min-delay-ms = 10

[storage]
database-path = "./test.db"
connections = 2
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.crawler.workers, 4);
        assert_eq!(config.crawler.queue_capacity, 64);
        assert!(!config.crawler.respect_robots);
        assert_eq!(config.crawler.user_agent, "TestBot/1.0");
        assert_eq!(config.politeness.min_delay_ms, 10);
        assert_eq!(config.connection_count(), 2);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let file = create_temp_config("[crawler]\nworkers = 2\n");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.crawler.workers, 2);
        assert_eq!(config.crawler.max_depth, 3);
        assert_eq!(config.storage.database_path, "./tsumugi.db");
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let file = create_temp_config("[crawler]\nworkers = 0\n");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_empty_user_agent_rejected() {
        let file = create_temp_config("[crawler]\nuser-agent = \"  \"\n");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");
        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");
        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();
        assert_ne!(hash1, hash2);
    }
}
