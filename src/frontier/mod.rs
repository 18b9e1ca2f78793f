//! URL frontier
//!
//! The frontier is the durable work queue of the crawl: a priority queue of
//! pending URLs plus the visited set, both backed by the store. Dedup is
//! atomic at the storage layer, so concurrent workers discovering the same
//! URL enqueue it exactly once.

use crate::storage::{FrontierRecord, SqliteStore, StorageResult};
use crate::{CrawlError, Result};
use std::sync::Arc;
use tracing::trace;

/// A unit of pending crawl work
#[derive(Debug, Clone, PartialEq)]
pub struct UrlTask {
    pub url: String,
    /// Lower values are dequeued first
    pub priority: i64,
    /// Link distance from the seed
    pub depth: u32,
    /// URL of the page this one was discovered on
    pub parent: Option<String>,
}

impl UrlTask {
    /// Creates a seed task at the given priority
    pub fn seed(url: &str, priority: i64) -> Self {
        Self {
            url: url.to_string(),
            priority,
            depth: 0,
            parent: None,
        }
    }

    /// Creates a task for a link discovered on `parent`
    pub fn child(url: &str, parent: &UrlTask) -> Self {
        Self {
            url: url.to_string(),
            priority: parent.priority + 1,
            depth: parent.depth + 1,
            parent: Some(parent.url.clone()),
        }
    }
}

/// Priority queue of pending URLs plus the visited set
pub struct Frontier {
    store: Arc<SqliteStore>,
    /// Re-scrape mode: enqueue ignores the visited set
    force_rescrape: bool,
}

impl Frontier {
    pub fn new(store: Arc<SqliteStore>, force_rescrape: bool) -> Self {
        Self {
            store,
            force_rescrape,
        }
    }

    /// Enqueues a task unless its URL is already visited or queued
    ///
    /// In re-scrape mode visited URLs may be enqueued again; duplicates
    /// already sitting in the queue are still rejected.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The task was added
    /// * `Ok(false)` - The URL was already visited or queued
    /// * `Err(_)` - The URL is empty, or the store failed
    pub fn enqueue(&self, task: &UrlTask) -> Result<bool> {
        if task.url.is_empty() {
            return Err(CrawlError::InvalidUrl {
                url: String::new(),
                message: "empty URL".to_string(),
            });
        }
        let added = self.store.frontier_push(
            &FrontierRecord {
                url: task.url.clone(),
                priority: task.priority,
                depth: task.depth,
                parent: task.parent.clone(),
            },
            self.force_rescrape,
        )?;
        trace!(url = %task.url, priority = task.priority, added, "enqueue");
        Ok(added)
    }

    /// Removes and returns the most urgent task, or None when empty
    ///
    /// Order is ascending priority, ties broken by insertion order.
    pub fn dequeue(&self) -> Result<Option<UrlTask>> {
        let record = self.store.frontier_pop()?;
        Ok(record.map(|r| UrlTask {
            url: r.url,
            priority: r.priority,
            depth: r.depth,
            parent: r.parent,
        }))
    }

    /// Marks the URLs visited and removes them from the queue, atomically
    pub fn mark_visited_bulk(&self, urls: &[String]) -> StorageResult<()> {
        self.store.mark_visited_bulk(urls)
    }

    /// Point lookup against the visited set
    pub fn is_visited(&self, url: &str) -> StorageResult<bool> {
        self.store.is_visited(url)
    }

    /// Number of pending tasks
    pub fn len(&self) -> StorageResult<u64> {
        self.store.frontier_len()
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.store.frontier_len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_frontier() -> (TempDir, Frontier) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(&dir.path().join("test.db"), 1).unwrap());
        (dir, Frontier::new(store, false))
    }

    #[test]
    fn test_enqueue_dequeue() {
        let (_dir, frontier) = make_frontier();
        let task = UrlTask::seed("https://example.com/", 0);
        assert!(frontier.enqueue(&task).unwrap());
        assert_eq!(frontier.dequeue().unwrap().unwrap(), task);
        assert!(frontier.dequeue().unwrap().is_none());
    }

    #[test]
    fn test_empty_url_rejected() {
        let (_dir, frontier) = make_frontier();
        let task = UrlTask::seed("", 0);
        assert!(matches!(
            frontier.enqueue(&task),
            Err(CrawlError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn enqueue_after_visit_is_noop() {
        let (_dir, frontier) = make_frontier();
        frontier
            .mark_visited_bulk(&["https://example.com/a".to_string()])
            .unwrap();
        let task = UrlTask::seed("https://example.com/a", 0);
        assert!(!frontier.enqueue(&task).unwrap());
        assert_eq!(frontier.len().unwrap(), 0);
    }

    #[test]
    fn test_force_rescrape_enqueues_visited() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(&dir.path().join("test.db"), 1).unwrap());
        let frontier = Frontier::new(store, true);
        frontier
            .mark_visited_bulk(&["https://example.com/a".to_string()])
            .unwrap();
        assert!(frontier.enqueue(&UrlTask::seed("https://example.com/a", 0)).unwrap());
        assert_eq!(frontier.len().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_enqueue_is_noop() {
        let (_dir, frontier) = make_frontier();
        let task = UrlTask::seed("https://example.com/a", 0);
        assert!(frontier.enqueue(&task).unwrap());
        assert!(!frontier.enqueue(&task).unwrap());
        assert_eq!(frontier.len().unwrap(), 1);
    }

    #[test]
    fn dequeue_orders_by_priority_then_fifo() {
        let (_dir, frontier) = make_frontier();
        frontier.enqueue(&UrlTask::seed("https://a.com/", 1)).unwrap();
        frontier.enqueue(&UrlTask::seed("https://b.com/", 5)).unwrap();
        frontier.enqueue(&UrlTask::seed("https://c.com/", 1)).unwrap();

        let order: Vec<String> = (0..3)
            .map(|_| frontier.dequeue().unwrap().unwrap().url)
            .collect();
        assert_eq!(order, vec!["https://a.com/", "https://c.com/", "https://b.com/"]);
    }

    #[test]
    fn test_mark_visited_dequeues() {
        let (_dir, frontier) = make_frontier();
        frontier.enqueue(&UrlTask::seed("https://a.com/", 1)).unwrap();
        frontier
            .mark_visited_bulk(&["https://a.com/".to_string()])
            .unwrap();
        assert!(frontier.is_visited("https://a.com/").unwrap());
        assert!(frontier.dequeue().unwrap().is_none());
    }

    #[test]
    fn test_mark_visited_bulk_mixed_batch() {
        let (_dir, frontier) = make_frontier();
        frontier.enqueue(&UrlTask::seed("https://a.com/", 0)).unwrap();
        frontier.enqueue(&UrlTask::seed("https://b.com/", 1)).unwrap();
        frontier.enqueue(&UrlTask::seed("https://d.com/", 2)).unwrap();

        // One call covering queued and never-queued URLs alike
        let batch = vec![
            "https://a.com/".to_string(),
            "https://b.com/".to_string(),
            "https://c.com/".to_string(),
        ];
        frontier.mark_visited_bulk(&batch).unwrap();

        for url in &batch {
            assert!(frontier.is_visited(url).unwrap());
        }
        // Only the URL outside the batch is still pending
        assert_eq!(frontier.len().unwrap(), 1);
        assert_eq!(frontier.dequeue().unwrap().unwrap().url, "https://d.com/");
    }

    #[test]
    fn test_child_task_inherits() {
        let parent = UrlTask::seed("https://a.com/", 2);
        let child = UrlTask::child("https://a.com/next", &parent);
        assert_eq!(child.priority, 3);
        assert_eq!(child.depth, 1);
        assert_eq!(child.parent.as_deref(), Some("https://a.com/"));
    }
}
