//! Breadth-first crawl frontier
//!
//! The queue, the visited set and the in-flight counter live behind one
//! mutex, so two workers discovering the same link produce one queue item.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;
use url::Url;

use super::parser::CrawlRequest;
use crate::http::HistoryType;
use crate::proxy::{HistoryRecord, MessageStore};
use crate::scope::Scope;

/// Crawl session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Idle,
    Running,
    Paused,
    Completed,
    Stopped,
}

impl CrawlState {
    pub fn is_finished(&self) -> bool {
        matches!(self, CrawlState::Completed | CrawlState::Stopped)
    }
}

/// A stored crawl request waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    /// Stored request
    pub record: HistoryRecord,

    /// Distance from the seed (seed is 0)
    pub depth: usize,
}

/// Frontier counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontierStats {
    /// Items accepted so far
    pub accepted: usize,

    /// Items waiting
    pub queued: usize,

    /// Items popped but not completed
    pub in_flight: usize,

    /// Candidates dropped as duplicates, out of scope or too deep
    pub dropped: usize,
}

struct FrontierInner {
    queue: VecDeque<QueueItem>,
    visited: HashSet<String>,
    in_flight: usize,
    state: CrawlState,
    accepted: usize,
    dropped: usize,
}

/// Work queue of one crawl session
pub struct Frontier {
    inner: Mutex<FrontierInner>,
    notify: Notify,
    store: Arc<dyn MessageStore>,
    scope: Arc<Scope>,
    max_depth: usize,
    max_pages: usize,
}

impl Frontier {
    pub fn new(
        store: Arc<dyn MessageStore>,
        scope: Arc<Scope>,
        max_depth: usize,
        max_pages: usize,
    ) -> Self {
        Self {
            inner: Mutex::new(FrontierInner {
                queue: VecDeque::new(),
                visited: HashSet::new(),
                in_flight: 0,
                state: CrawlState::Idle,
                accepted: 0,
                dropped: 0,
            }),
            notify: Notify::new(),
            store,
            scope,
            max_depth,
            max_pages,
        }
    }

    /// Insert a crawl root at depth 0. Out-of-scope or visited URLs are ignored.
    pub fn seed(&self, url: &str) -> bool {
        self.insert(CrawlRequest::Get(url.to_string()), 0)
    }

    /// Insert a discovered request one level below its parent
    pub fn enqueue_child(&self, parent_depth: usize, candidate: CrawlRequest) -> bool {
        let depth = parent_depth + 1;
        if depth > self.max_depth {
            tracing::trace!(url = %candidate.url(), depth, "Dropping candidate beyond max depth");
            self.inner.lock().dropped += 1;
            return false;
        }
        self.insert(candidate, depth)
    }

    fn insert(&self, candidate: CrawlRequest, depth: usize) -> bool {
        let url = match Url::parse(candidate.url()) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(url = %candidate.url(), error = %e, "Dropping unparsable candidate");
                return false;
            }
        };

        if !self.scope.is_in_scope(&url) {
            tracing::trace!(url = %url, "Dropping out-of-scope candidate");
            self.inner.lock().dropped += 1;
            return false;
        }

        let key = crawl_key(&candidate, &url);

        let mut inner = self.inner.lock();
        if inner.state.is_finished() {
            return false;
        }
        if inner.visited.contains(&key) || inner.accepted >= self.max_pages {
            inner.dropped += 1;
            return false;
        }

        let message = match candidate.to_message() {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Cannot build crawl request");
                return false;
            }
        };

        let record = match self
            .store
            .store(&message, HistoryType::SpiderTask)
            .and_then(|id| self.store.record(id))
        {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Failed to store crawl request");
                return false;
            }
        };

        inner.visited.insert(key);
        inner.accepted += 1;
        inner.queue.push_back(QueueItem { record, depth });
        drop(inner);

        tracing::debug!(url = %url, depth, "Queued");
        self.notify.notify_waiters();
        true
    }

    /// Pop the next item in FIFO order.
    ///
    /// Waits while paused, or while the queue is empty but fetches are still
    /// in flight (they may add children). Returns `None` once the crawl has
    /// completed or been stopped.
    pub async fn next(&self) -> Option<QueueItem> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock();
                match inner.state {
                    CrawlState::Completed | CrawlState::Stopped => return None,
                    CrawlState::Paused => {}
                    CrawlState::Idle | CrawlState::Running => {
                        if let Some(item) = inner.queue.pop_front() {
                            inner.state = CrawlState::Running;
                            inner.in_flight += 1;
                            return Some(item);
                        }
                        if inner.in_flight == 0 {
                            inner.state = CrawlState::Completed;
                            drop(inner);
                            tracing::debug!("Frontier exhausted");
                            self.notify.notify_waiters();
                            return None;
                        }
                    }
                }
            }

            notified.await;
        }
    }

    /// Mark a popped item as fully processed
    pub fn complete(&self, item: &QueueItem) {
        {
            let mut inner = self.inner.lock();
            inner.in_flight = inner.in_flight.saturating_sub(1);
        }
        tracing::trace!(id = %item.record.id, "Crawl item complete");
        self.notify.notify_waiters();
    }

    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.state, CrawlState::Idle | CrawlState::Running) {
            inner.state = CrawlState::Paused;
        }
    }

    pub fn resume(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state == CrawlState::Paused {
                inner.state = CrawlState::Running;
            }
        }
        self.notify.notify_waiters();
    }

    /// Stop handing out work; queued items are discarded
    pub fn stop(&self) {
        {
            let mut inner = self.inner.lock();
            if !inner.state.is_finished() {
                inner.state = CrawlState::Stopped;
                inner.queue.clear();
            }
        }
        self.notify.notify_waiters();
    }

    pub fn state(&self) -> CrawlState {
        self.inner.lock().state
    }

    pub fn stats(&self) -> FrontierStats {
        let inner = self.inner.lock();
        FrontierStats {
            accepted: inner.accepted,
            queued: inner.queue.len(),
            in_flight: inner.in_flight,
            dropped: inner.dropped,
        }
    }
}

/// Deduplication key of a crawl request.
///
/// GET: scheme, host, non-default port, path and sorted query pairs.
/// POST: method, the GET key and a SHA-256 of the body.
pub fn crawl_key(request: &CrawlRequest, url: &Url) -> String {
    let mut key = format!(
        "{}://{}",
        url.scheme(),
        url.host_str().unwrap_or_default().to_ascii_lowercase()
    );
    if let Some(port) = url.port() {
        key.push_str(&format!(":{}", port));
    }
    key.push_str(if url.path().is_empty() { "/" } else { url.path() });

    if let Some(query) = url.query() {
        let mut pairs: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();
        pairs.sort_unstable();
        if !pairs.is_empty() {
            key.push('?');
            key.push_str(&pairs.join("&"));
        }
    }

    match request {
        CrawlRequest::Get(_) => key,
        CrawlRequest::PostForm { body, .. } => {
            let digest = Sha256::digest(body.as_bytes());
            format!("POST {} {}", key, hex::encode(digest))
        }
    }
}
