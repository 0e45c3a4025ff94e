//! Scan session
//!
//! Owns what one engagement shares: message history, scope, the
//! vulnerability catalog, the alert set and the passive scanner. Captured and
//! crawled traffic flows through the passive scanner; active scans run over
//! the nodes recorded in history.

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::app::Config;
use crate::error::{CatalogError, HarrowError, ScannerError};
use crate::http::{HistoryId, HistoryType, HttpMessage, HttpSender, MessageSender, RetryPolicy};
use crate::proxy::{InMemoryStore, MessageStore};
use crate::scanner::active::attacks;
use crate::scanner::passive::default_analyzers;
use crate::scanner::{
    ActiveScanner, Alert, AlertCollector, AuthStateDetector, Catalog, PassiveScanDispatcher,
    ScanPolicy, SharedCatalog,
};
use crate::scanner::active::ScanReport;
use crate::scope::Scope;
use crate::spider::{Spider, SpiderStats};

pub struct ScanSession {
    id: Uuid,
    config: Config,
    store: Arc<InMemoryStore>,
    scope: Arc<Scope>,
    catalog: Arc<SharedCatalog>,
    alerts: AlertCollector,
    passive: Arc<PassiveScanDispatcher>,
    auth: Arc<AuthStateDetector>,
    sender: Arc<dyn MessageSender>,
    retry: RetryPolicy,
}

impl ScanSession {
    /// Build a session around `sender`.
    ///
    /// `target` becomes the scope when the configuration has no include rules.
    pub fn new(
        config: Config,
        target: Option<&str>,
        sender: Arc<dyn MessageSender>,
    ) -> Result<Self, HarrowError> {
        config.validate()?;

        let id = Uuid::new_v4();
        let catalog = Arc::new(SharedCatalog::new(load_catalog(&config)?));
        let scope = Arc::new(Scope::from_config(&config.scope, target)?);
        let auth = Arc::new(AuthStateDetector::from_config(&config.auth)?);
        let alerts = AlertCollector::spawn();
        let passive = Arc::new(PassiveScanDispatcher::spawn(
            default_analyzers(Some(Arc::clone(&auth))),
            &config.passive,
            Arc::clone(&catalog),
            alerts.sink(),
        ));

        tracing::info!(
            session = %id,
            scope = %scope.summary(),
            catalog_entries = catalog.current().len(),
            "Scan session created"
        );

        Ok(Self {
            id,
            store: Arc::new(InMemoryStore::new(id, config.general.max_history_items)),
            retry: RetryPolicy::from_config(&config.scanner),
            config,
            scope,
            catalog,
            alerts,
            passive,
            auth,
            sender,
        })
    }

    /// Build a session that talks to the network through reqwest
    pub fn connect(config: Config, target: Option<&str>) -> Result<Self, HarrowError> {
        let sender = HttpSender::new(&config.scanner)?;
        Self::new(config, target, Arc::new(sender))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn store(&self) -> Arc<InMemoryStore> {
        Arc::clone(&self.store)
    }

    /// Record an exchange relayed by the proxy and queue it for passive analysis
    pub fn capture(&self, message: &HttpMessage) -> Result<HistoryId, HarrowError> {
        let id = self.store.store(message, HistoryType::Proxied)?;

        let mut stored = message.clone();
        stored.id = Some(id);
        stored.history_type = HistoryType::Proxied;
        self.passive.submit(stored);

        Ok(id)
    }

    /// A spider wired to this session's history, scope and passive scanner
    pub fn spider(&self) -> Arc<Spider> {
        let store: Arc<dyn MessageStore> = self.store.clone();
        let mut spider = Spider::new(
            self.config.spider.clone(),
            Arc::clone(&self.scope),
            Arc::clone(&self.sender),
            store,
            self.retry,
        );
        spider.add_listener(self.passive.clone());
        Arc::new(spider)
    }

    /// Crawl from `seed` to completion
    pub async fn crawl(&self, seed: &str) -> Result<SpiderStats, ScannerError> {
        self.spider().crawl(seed).await
    }

    /// In-scope exchanges with a response, one per method and URL, oldest first
    pub fn scan_nodes(&self) -> Vec<HttpMessage> {
        let mut seen = HashSet::new();
        self.store
            .records()
            .into_iter()
            .filter(|r| matches!(r.history_type, HistoryType::Proxied | HistoryType::Spider))
            .filter(|r| self.scope.is_in_scope_str(&r.url))
            .filter(|r| seen.insert(format!("{} {}", r.method, r.url)))
            .filter_map(|r| self.store.load(r.id).ok())
            .filter(|m| m.has_response())
            .collect()
    }

    /// Active scanner over the built-in plugins, reporting into this session
    pub fn active_scanner(&self, policy: ScanPolicy) -> ActiveScanner {
        ActiveScanner::new(
            attacks::all(),
            policy,
            Arc::clone(&self.sender),
            self.retry,
            Arc::clone(&self.catalog),
            self.alerts.sink(),
        )
    }

    /// Actively scan every recorded node
    pub async fn active_scan(&self, policy: ScanPolicy) -> Result<ScanReport, ScannerError> {
        let nodes = self.scan_nodes();
        self.active_scanner(policy).scan(nodes).await
    }

    /// Wait until submitted messages are analyzed and raised alerts recorded
    pub async fn flush(&self) {
        self.passive.flush().await;
        self.alerts.flush().await;
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.snapshot()
    }

    pub fn alerts_for(&self, id: HistoryId) -> Vec<Alert> {
        self.alerts.alerts_for(id)
    }

    /// Messages the passive scanner has analyzed
    pub fn passive_processed(&self) -> usize {
        self.passive.processed()
    }

    /// Logged-in / logged-out indicator hits
    pub fn auth_counts(&self) -> (usize, usize) {
        self.auth.counts()
    }

    /// Re-read the catalog; alerts raised afterwards use the new entries
    pub fn reload_catalog(&self) -> Result<(), CatalogError> {
        self.catalog.replace(load_catalog(&self.config)?);
        tracing::info!(entries = self.catalog.current().len(), "Catalog reloaded");
        Ok(())
    }
}

fn load_catalog(config: &Config) -> Result<Catalog, CatalogError> {
    match &config.scanner.catalog_path {
        Some(path) => Catalog::load(path),
        None => Catalog::bundled(),
    }
}
