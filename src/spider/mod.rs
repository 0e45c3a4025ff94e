//! Web spider/crawler module
//!
//! Discovers application structure breadth-first from one or more seeds.

mod filter;
mod frontier;
mod parser;
mod robots;
mod tags;

pub use filter::{MaxSizeFilter, ParseFilter, ParseFilters, TextContentFilter, DEFAULT_MAX_PARSE_SIZE};
pub use frontier::{crawl_key, CrawlState, Frontier, FrontierStats, QueueItem};
pub use parser::{parse_message, resolve_link, CrawlRequest, ParserOptions};
pub use robots::RobotsTxt;
pub use tags::{extract_attribute, scan_tags, FormElement, FormField, MarkupScan, Tag, TagKind};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::app::SpiderConfig;
use crate::error::ScannerError;
use crate::http::{send_with_retry, HistoryType, HttpMessage, MessageSender, RetryPolicy};
use crate::proxy::MessageStore;
use crate::scope::Scope;

/// Receives every message the spider fetches
pub trait SpiderListener: Send + Sync {
    fn on_message(&self, message: &HttpMessage);
}

/// Spider statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpiderStats {
    /// Responses received
    pub fetched: usize,

    /// Requests that failed after retries
    pub failed: usize,

    /// Responses not parsed for links
    pub filtered: usize,

    /// Frontier counters
    pub frontier: FrontierStats,
}

#[derive(Default)]
struct Counters {
    fetched: AtomicUsize,
    failed: AtomicUsize,
    filtered: AtomicUsize,
}

/// One crawl session
pub struct Spider {
    config: SpiderConfig,
    frontier: Arc<Frontier>,
    sender: Arc<dyn MessageSender>,
    store: Arc<dyn MessageStore>,
    listeners: Vec<Arc<dyn SpiderListener>>,
    filters: ParseFilters,
    retry: RetryPolicy,
    counters: Counters,
}

impl Spider {
    pub fn new(
        config: SpiderConfig,
        scope: Arc<Scope>,
        sender: Arc<dyn MessageSender>,
        store: Arc<dyn MessageStore>,
        retry: RetryPolicy,
    ) -> Self {
        let frontier = Arc::new(Frontier::new(
            Arc::clone(&store),
            scope,
            config.max_depth,
            config.max_pages,
        ));

        Self {
            filters: ParseFilters::new(config.max_parse_size),
            config,
            frontier,
            sender,
            store,
            listeners: Vec::new(),
            retry,
            counters: Counters::default(),
        }
    }

    /// Register a listener for fetched messages
    pub fn add_listener(&mut self, listener: Arc<dyn SpiderListener>) {
        self.listeners.push(listener);
    }

    /// Crawl from `seed` until the frontier is exhausted or the crawl is stopped
    pub async fn crawl(self: &Arc<Self>, seed: &str) -> Result<SpiderStats, ScannerError> {
        let seed_url =
            url::Url::parse(seed).map_err(|_| ScannerError::InvalidTarget(seed.to_string()))?;

        if !self.frontier.seed(seed_url.as_str()) {
            tracing::warn!(seed = %seed_url, "Seed is out of scope, nothing to crawl");
        }
        if self.config.parse_robots {
            if let Ok(robots) = seed_url.join("/robots.txt") {
                self.frontier.seed(robots.as_str());
            }
        }

        tracing::info!(seed = %seed_url, threads = self.config.threads, "Starting crawl");

        let mut handles = Vec::with_capacity(self.config.threads);
        for worker in 0..self.config.threads.max(1) {
            handles.push(tokio::spawn(Arc::clone(self).worker(worker)));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Spider worker panicked");
            }
        }

        let stats = self.stats();
        tracing::info!(
            fetched = stats.fetched,
            failed = stats.failed,
            accepted = stats.frontier.accepted,
            state = ?self.frontier.state(),
            "Crawl finished"
        );
        Ok(stats)
    }

    async fn worker(self: Arc<Self>, worker: usize) {
        while let Some(item) = self.frontier.next().await {
            // Items are completed even when processing panics
            let spider = Arc::clone(&self);
            let task_item = item.clone();
            let outcome = tokio::spawn(async move { spider.process(&task_item).await }).await;
            if let Err(e) = outcome {
                tracing::error!(url = %item.record.url, error = %e, "Crawl item processing panicked");
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
            self.frontier.complete(&item);

            if self.config.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.delay_ms)).await;
            }
        }
        tracing::trace!(worker, "Spider worker done");
    }

    async fn process(&self, item: &QueueItem) {
        let mut message = match self.store.load(item.record.id) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(id = %item.record.id, error = %e, "Crawl request missing from history");
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        message.id = None;
        message.history_type = HistoryType::Spider;

        if let Err(e) = send_with_retry(self.sender.as_ref(), &mut message, self.retry).await {
            tracing::debug!(url = %item.record.url, error = %e, "Fetch failed");
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.counters.fetched.fetch_add(1, Ordering::Relaxed);

        match self.store.store(&message, HistoryType::Spider) {
            Ok(id) => message.id = Some(id),
            Err(e) => tracing::warn!(url = %item.record.url, error = %e, "Failed to store response"),
        }

        for listener in &self.listeners {
            listener.on_message(&message);
        }

        if let Some(filter) = self.filters.rejected_by(&message) {
            tracing::trace!(url = %item.record.url, filter, "Not parsing response");
            self.counters.filtered.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let options = ParserOptions {
            submit_forms: self.config.submit_forms,
            post_forms: self.config.post_forms,
        };
        for candidate in parse_message(&message, options) {
            self.frontier.enqueue_child(item.depth, candidate);
        }
    }

    pub fn pause(&self) {
        self.frontier.pause();
    }

    pub fn resume(&self) {
        self.frontier.resume();
    }

    pub fn stop(&self) {
        self.frontier.stop();
    }

    pub fn state(&self) -> CrawlState {
        self.frontier.state()
    }

    pub fn stats(&self) -> SpiderStats {
        SpiderStats {
            fetched: self.counters.fetched.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            filtered: self.counters.filtered.load(Ordering::Relaxed),
            frontier: self.frontier.stats(),
        }
    }
}
