//! Per-node plugin sequencing over a bounded worker pool

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinError;

use super::{ActivePlugin, AttackContext, IssueKind, PluginError, PluginScope, ScanControl, ScanIssue};
use crate::error::ScannerError;
use crate::http::{HttpMessage, MessageSender, RetryPolicy};
use crate::scanner::policies::ScanPolicy;
use crate::scanner::variant::{Variant, VariantFactory};
use crate::scanner::{Alert, AlertSink, AlertThreshold, Catalog, SharedCatalog};

/// Counters readable while a scan runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanProgress {
    pub nodes_total: usize,
    pub nodes_done: usize,
    pub attempts: usize,
    pub alerts: usize,
    pub issues: usize,
}

#[derive(Default)]
struct Counters {
    nodes_total: AtomicUsize,
    nodes_done: AtomicUsize,
    attempts: AtomicUsize,
    alerts: AtomicUsize,
    issues: AtomicUsize,
}

impl Counters {
    fn reset(&self, nodes_total: usize) {
        self.nodes_total.store(nodes_total, Ordering::Relaxed);
        for counter in [&self.nodes_done, &self.attempts, &self.alerts, &self.issues] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> ScanProgress {
        ScanProgress {
            nodes_total: self.nodes_total.load(Ordering::Relaxed),
            nodes_done: self.nodes_done.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
            issues: self.issues.load(Ordering::Relaxed),
        }
    }
}

/// Where one node stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Stopped,
}

/// Outcome of one scan
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// URL and final status of each node, in input order
    pub nodes: Vec<(String, NodeStatus)>,
    pub issues: Vec<ScanIssue>,
    pub progress: ScanProgress,
}

/// State shared by every task of one scan
struct Shared {
    policy: ScanPolicy,
    variants: Vec<Arc<dyn Variant>>,
    sender: Arc<dyn MessageSender>,
    retry: RetryPolicy,
    catalog: Arc<Catalog>,
    sink: AlertSink,
    control: ScanControl,
    counters: Arc<Counters>,
    issues: Mutex<Vec<ScanIssue>>,
    statuses: Arc<Mutex<Vec<NodeStatus>>>,
}

impl Shared {
    fn context(&self, plugin: &dyn ActivePlugin, base: HttpMessage) -> AttackContext {
        AttackContext::new(
            base,
            self.policy.plugin(plugin.key()),
            Arc::clone(&self.catalog),
            Arc::clone(&self.sender),
            self.retry,
            Duration::from_millis(self.policy.settings.delay_ms),
        )
    }

    fn set_status(&self, index: usize, status: NodeStatus) {
        if let Some(slot) = self.statuses.lock().get_mut(index) {
            *slot = status;
        }
    }

    /// Account for one finished attempt
    fn record(
        &self,
        plugin: &dyn ActivePlugin,
        url: &str,
        param: Option<&str>,
        outcome: Result<Result<Vec<Alert>, PluginError>, JoinError>,
    ) {
        self.counters.attempts.fetch_add(1, Ordering::Relaxed);

        let (kind, detail) = match outcome {
            Ok(Ok(alerts)) => {
                let threshold = self
                    .policy
                    .plugin(plugin.key())
                    .threshold
                    .resolve(AlertThreshold::Medium);
                for alert in alerts {
                    if threshold.permits(alert.confidence) {
                        self.counters.alerts.fetch_add(1, Ordering::Relaxed);
                        self.sink.raise(alert);
                    }
                }
                return;
            }
            Ok(Err(PluginError::Network(e))) => (IssueKind::CouldNotTest, e.to_string()),
            Ok(Err(e)) => (IssueKind::PluginFault, e.to_string()),
            Err(e) if e.is_panic() => (IssueKind::PluginFault, "plugin panicked".to_string()),
            Err(e) => (IssueKind::PluginFault, e.to_string()),
        };

        tracing::warn!(
            plugin = plugin.key(),
            url,
            param,
            kind = ?kind,
            detail = %detail,
            "Attack attempt failed"
        );
        self.counters.issues.fetch_add(1, Ordering::Relaxed);
        self.issues.lock().push(ScanIssue {
            kind,
            plugin: plugin.key().to_string(),
            url: url.to_string(),
            param: param.map(String::from),
            detail,
        });
    }
}

/// Runs attack plugins over captured nodes
pub struct ActiveScanner {
    node_plugins: Vec<Arc<dyn ActivePlugin>>,
    host_plugins: Vec<Arc<dyn ActivePlugin>>,
    variants: Vec<Arc<dyn Variant>>,
    policy: ScanPolicy,
    sender: Arc<dyn MessageSender>,
    retry: RetryPolicy,
    catalog: Arc<SharedCatalog>,
    sink: AlertSink,
    control: ScanControl,
    counters: Arc<Counters>,
    statuses: Arc<Mutex<Vec<NodeStatus>>>,
    running: AtomicBool,
}

impl ActiveScanner {
    /// Keep the plugins the policy enables, ordered by (priority, category)
    pub fn new(
        plugins: Vec<Arc<dyn ActivePlugin>>,
        policy: ScanPolicy,
        sender: Arc<dyn MessageSender>,
        retry: RetryPolicy,
        catalog: Arc<SharedCatalog>,
        sink: AlertSink,
    ) -> Self {
        let mut plugins: Vec<_> = plugins
            .into_iter()
            .filter(|p| policy.is_enabled(p.key()))
            .collect();
        plugins.sort_by_key(|p| (p.priority(), p.category()));

        let (host_plugins, node_plugins) = plugins
            .into_iter()
            .partition(|p| p.scope() == PluginScope::Host);

        Self {
            node_plugins,
            host_plugins,
            variants: VariantFactory::from_settings(&policy.settings),
            policy,
            sender,
            retry,
            catalog,
            sink,
            control: ScanControl::new(),
            counters: Arc::new(Counters::default()),
            statuses: Arc::new(Mutex::new(Vec::new())),
            running: AtomicBool::new(false),
        }
    }

    /// Pause/stop handle
    pub fn control(&self) -> ScanControl {
        self.control.clone()
    }

    pub fn progress(&self) -> ScanProgress {
        self.counters.snapshot()
    }

    /// Status of each node of the current or last scan
    pub fn node_statuses(&self) -> Vec<NodeStatus> {
        self.statuses.lock().clone()
    }

    /// Keys of the plugins that will run, in execution order (host plugins first)
    pub fn plugin_keys(&self) -> Vec<&'static str> {
        self.host_plugins
            .iter()
            .chain(&self.node_plugins)
            .map(|p| p.key())
            .collect()
    }

    /// Scan `nodes` until done or stopped
    pub async fn scan(&self, nodes: Vec<HttpMessage>) -> Result<ScanReport, ScannerError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ScannerError::AlreadyRunning);
        }
        let _running = RunningGuard(&self.running);

        let urls: Vec<String> = nodes.iter().map(|n| n.url_string()).collect();
        self.counters.reset(nodes.len());
        *self.statuses.lock() = vec![NodeStatus::Pending; nodes.len()];

        tracing::info!(
            nodes = nodes.len(),
            node_plugins = self.node_plugins.len(),
            host_plugins = self.host_plugins.len(),
            variants = self.variants.len(),
            policy = %self.policy.name,
            "Active scan started"
        );

        let shared = Arc::new(Shared {
            policy: self.policy.clone(),
            variants: self.variants.clone(),
            sender: Arc::clone(&self.sender),
            retry: self.retry,
            catalog: self.catalog.current(),
            sink: self.sink.clone(),
            control: self.control.clone(),
            counters: Arc::clone(&self.counters),
            issues: Mutex::new(Vec::new()),
            statuses: Arc::clone(&self.statuses),
        });

        // One base message per host, the first node seen for it
        let mut host_done: HashMap<String, watch::Receiver<bool>> = HashMap::new();
        let mut host_tasks = Vec::new();
        for node in &nodes {
            let host = host_key(node);
            if host_done.contains_key(&host) {
                continue;
            }

            let (done_tx, done_rx) = watch::channel(self.host_plugins.is_empty());
            host_done.insert(host, done_rx);
            if self.host_plugins.is_empty() {
                continue;
            }

            host_tasks.push(tokio::spawn(run_host(
                Arc::clone(&shared),
                self.host_plugins.clone(),
                node.clone(),
                done_tx,
            )));
        }

        let semaphore = Arc::new(Semaphore::new(self.policy.settings.max_threads.max(1)));
        let mut node_tasks = Vec::new();
        for (index, node) in nodes.into_iter().enumerate() {
            if !shared.control.checkpoint().await {
                break;
            }
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let done = host_done.get(&host_key(&node)).cloned();
            node_tasks.push(tokio::spawn(run_node(
                Arc::clone(&shared),
                self.node_plugins.clone(),
                index,
                node,
                permit,
                done,
            )));
        }

        for task in node_tasks.into_iter().chain(host_tasks) {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Scan task failed");
            }
        }

        let statuses: Vec<NodeStatus> = {
            let mut statuses = self.statuses.lock();
            for status in statuses.iter_mut() {
                if matches!(status, NodeStatus::Pending | NodeStatus::Running) {
                    *status = NodeStatus::Stopped;
                }
            }
            statuses.clone()
        };

        let progress = self.progress();
        tracing::info!(
            nodes_done = progress.nodes_done,
            attempts = progress.attempts,
            alerts = progress.alerts,
            issues = progress.issues,
            "Active scan finished"
        );

        let issues = shared.issues.lock().clone();
        Ok(ScanReport {
            nodes: urls.into_iter().zip(statuses).collect(),
            issues,
            progress,
        })
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn host_key(node: &HttpMessage) -> String {
    node.origin().unwrap_or_else(|| node.url_string())
}

/// Node-scoped plugins in order; every injection point attempted in turn
async fn run_node(
    shared: Arc<Shared>,
    plugins: Vec<Arc<dyn ActivePlugin>>,
    index: usize,
    node: HttpMessage,
    permit: OwnedSemaphorePermit,
    host_done: Option<watch::Receiver<bool>>,
) {
    shared.set_status(index, NodeStatus::Running);
    let url = node.url_string();
    let points: Vec<_> = shared
        .variants
        .iter()
        .flat_map(|variant| {
            variant
                .extract(&node)
                .into_iter()
                .map(move |point| (Arc::clone(variant), point))
        })
        .collect();

    tracing::debug!(url = %url, points = points.len(), "Scanning node");

    let mut stopped = false;
    'plugins: for plugin in &plugins {
        if !shared.control.checkpoint().await {
            stopped = true;
            break;
        }

        let ctx = Arc::new(shared.context(plugin.as_ref(), node.clone()));
        for (variant, point) in &points {
            if !shared.control.checkpoint().await {
                stopped = true;
                break 'plugins;
            }

            let attempt = {
                let plugin = Arc::clone(plugin);
                let ctx = Arc::clone(&ctx);
                let variant = Arc::clone(variant);
                let point = point.clone();
                tokio::spawn(async move { plugin.attack_point(&ctx, variant.as_ref(), &point).await })
            };
            shared.record(plugin.as_ref(), &url, Some(&point.name), attempt.await);
        }

        tracing::debug!(plugin = plugin.key(), url = %url, "Plugin finished on node");
    }
    drop(permit);

    if !stopped {
        if let Some(mut done) = host_done {
            let _ = done.wait_for(|finished| *finished).await;
        }
        stopped = shared.control.is_stopped();
    }

    if stopped {
        shared.set_status(index, NodeStatus::Stopped);
    } else {
        shared.set_status(index, NodeStatus::Completed);
        shared.counters.nodes_done.fetch_add(1, Ordering::Relaxed);
    }
}

/// Host-scoped plugins run concurrently, once for this host
async fn run_host(
    shared: Arc<Shared>,
    plugins: Vec<Arc<dyn ActivePlugin>>,
    base: HttpMessage,
    done: watch::Sender<bool>,
) {
    let url = base.url_string();
    let mut attempts = Vec::new();

    for plugin in plugins {
        if !shared.control.checkpoint().await {
            break;
        }
        let ctx = shared.context(plugin.as_ref(), base.clone());
        let task = {
            let plugin = Arc::clone(&plugin);
            tokio::spawn(async move { plugin.attack_host(&ctx).await })
        };
        attempts.push((plugin, task));
    }

    for (plugin, task) in attempts {
        shared.record(plugin.as_ref(), &url, None, task.await);
    }

    let _ = done.send(true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HttpError;
    use crate::scanner::active::PluginCategory;
    use crate::scanner::variant::InjectionPoint;
    use crate::scanner::{AlertCollector, Confidence, Risk};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    struct Refused;

    #[async_trait]
    impl MessageSender for Refused {
        async fn send(&self, _message: &mut HttpMessage) -> Result<(), HttpError> {
            Err(HttpError::ConnectionError("refused".into()))
        }
    }

    type Log = Arc<Mutex<Vec<(String, &'static str, usize)>>>;

    /// Records every attempt; fails or panics on chosen positions
    struct Scripted {
        key: &'static str,
        priority: u32,
        log: Log,
        fail_at: Option<usize>,
        panic_at: Option<usize>,
    }

    impl Scripted {
        fn new(key: &'static str, priority: u32, log: &Log) -> Self {
            Self {
                key,
                priority,
                log: Arc::clone(log),
                fail_at: None,
                panic_at: None,
            }
        }
    }

    #[async_trait]
    impl ActivePlugin for Scripted {
        fn key(&self) -> &'static str {
            self.key
        }

        fn plugin_id(&self) -> u32 {
            99000 + self.priority
        }

        fn priority(&self) -> u32 {
            self.priority
        }

        fn category(&self) -> PluginCategory {
            PluginCategory::Misc
        }

        async fn attack_point(
            &self,
            ctx: &AttackContext,
            _variant: &dyn Variant,
            point: &InjectionPoint,
        ) -> Result<Vec<Alert>, PluginError> {
            self.log.lock().push((ctx.base.url_string(), self.key, point.position));
            tokio::time::sleep(Duration::from_millis(2)).await;

            if self.panic_at == Some(point.position) {
                panic!("scripted panic");
            }
            if self.fail_at == Some(point.position) {
                return Err(PluginError::Failed("scripted failure".into()));
            }

            Ok(vec![Alert::new(self.plugin_id(), self.key, Risk::Low, Confidence::High)
                .for_message(&ctx.base)
                .with_param(&point.name)])
        }
    }

    /// Host plugin that waits for the test to release it
    struct Gate {
        calls: Arc<AtomicUsize>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl ActivePlugin for Gate {
        fn key(&self) -> &'static str {
            "gate"
        }

        fn plugin_id(&self) -> u32 {
            99999
        }

        fn category(&self) -> PluginCategory {
            PluginCategory::Server
        }

        fn scope(&self) -> PluginScope {
            PluginScope::Host
        }

        async fn attack_host(&self, _ctx: &AttackContext) -> Result<Vec<Alert>, PluginError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Ok(Vec::new())
        }
    }

    /// Sends once per point through the session sender
    struct Sends;

    #[async_trait]
    impl ActivePlugin for Sends {
        fn key(&self) -> &'static str {
            "sends"
        }

        fn plugin_id(&self) -> u32 {
            99998
        }

        fn category(&self) -> PluginCategory {
            PluginCategory::Injection
        }

        async fn attack_point(
            &self,
            ctx: &AttackContext,
            variant: &dyn Variant,
            point: &InjectionPoint,
        ) -> Result<Vec<Alert>, PluginError> {
            let mut message = ctx.inject(variant, point, "x", false)?;
            ctx.send(&mut message).await?;
            Ok(Vec::new())
        }
    }

    fn policy(threads: usize) -> ScanPolicy {
        let mut policy = ScanPolicy::standard();
        policy.settings.max_threads = threads;
        policy
    }

    fn scanner(plugins: Vec<Arc<dyn ActivePlugin>>, threads: usize, sink: AlertSink) -> ActiveScanner {
        ActiveScanner::new(
            plugins,
            policy(threads),
            Arc::new(Refused),
            RetryPolicy {
                max_retries: 0,
                timeout: Duration::from_secs(1),
                backoff: Duration::ZERO,
            },
            Arc::new(SharedCatalog::new(Catalog::default())),
            sink,
        )
    }

    fn node(url: &str) -> HttpMessage {
        HttpMessage::get(url).unwrap()
    }

    #[tokio::test]
    async fn test_fault_on_third_point_does_not_stop_the_rest() {
        let log: Log = Arc::default();
        let collector = AlertCollector::spawn();
        let mut plugin = Scripted::new("scripted", 1, &log);
        plugin.fail_at = Some(2);

        let scanner = scanner(vec![Arc::new(plugin)], 2, collector.sink());
        let report = scanner
            .scan(vec![node("http://example.test/p?a=1&b=2&c=3&d=4&e=5")])
            .await
            .unwrap();
        collector.flush().await;

        let positions: Vec<usize> = log.lock().iter().map(|(_, _, p)| *p).collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4]);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, IssueKind::PluginFault);
        assert_eq!(report.issues[0].param.as_deref(), Some("c"));
        assert_eq!(report.progress.attempts, 5);
        assert_eq!(collector.len(), 4);
        assert_eq!(report.nodes[0].1, NodeStatus::Completed);
    }

    #[tokio::test]
    async fn test_panicking_plugin_is_isolated() {
        let log: Log = Arc::default();
        let collector = AlertCollector::spawn();
        let mut plugin = Scripted::new("scripted", 1, &log);
        plugin.panic_at = Some(2);

        let scanner = scanner(vec![Arc::new(plugin)], 1, collector.sink());
        let report = scanner
            .scan(vec![node("http://example.test/p?a=1&b=2&c=3&d=4&e=5")])
            .await
            .unwrap();

        assert_eq!(log.lock().len(), 5);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].detail, "plugin panicked");
    }

    #[tokio::test]
    async fn test_plugins_run_in_order_per_node() {
        let log: Log = Arc::default();
        let collector = AlertCollector::spawn();
        let plugins: Vec<Arc<dyn ActivePlugin>> = vec![
            Arc::new(Scripted::new("second", 2, &log)),
            Arc::new(Scripted::new("first", 1, &log)),
        ];

        let scanner = scanner(plugins, 3, collector.sink());
        assert_eq!(scanner.plugin_keys(), vec!["first", "second"]);

        let nodes = vec![
            node("http://example.test/a?x=1&y=2&z=3"),
            node("http://example.test/b?x=1&y=2"),
            node("http://example.test/c?x=1&y=2&z=3"),
        ];
        let report = scanner.scan(nodes).await.unwrap();
        assert!(report.nodes.iter().all(|(_, s)| *s == NodeStatus::Completed));

        let log = log.lock().clone();
        for (url, points) in [
            ("http://example.test/a?x=1&y=2&z=3", 3),
            ("http://example.test/b?x=1&y=2", 2),
            ("http://example.test/c?x=1&y=2&z=3", 3),
        ] {
            let sequence: Vec<(&str, usize)> = log
                .iter()
                .filter(|(u, _, _)| u == url)
                .map(|(_, k, p)| (*k, *p))
                .collect();
            let expected: Vec<(&str, usize)> = (0..points)
                .map(|p| ("first", p))
                .chain((0..points).map(|p| ("second", p)))
                .collect();
            assert_eq!(sequence, expected, "order for {}", url);
        }
    }

    #[tokio::test]
    async fn test_node_completes_after_host_plugins() {
        let log: Log = Arc::default();
        let collector = AlertCollector::spawn();
        let calls = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());
        let plugins: Vec<Arc<dyn ActivePlugin>> = vec![
            Arc::new(Scripted::new("scripted", 1, &log)),
            Arc::new(Gate {
                calls: Arc::clone(&calls),
                release: Arc::clone(&release),
            }),
        ];

        let scanner = Arc::new(scanner(plugins, 2, collector.sink()));
        let task = {
            let scanner = Arc::clone(&scanner);
            tokio::spawn(async move {
                scanner
                    .scan(vec![
                        node("http://one.test/?a=1"),
                        node("http://one.test/x?b=2"),
                        node("http://two.test/?c=3"),
                    ])
                    .await
            })
        };

        // Node plugins finish while the host plugins are held
        while log.lock().len() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(scanner
            .node_statuses()
            .iter()
            .all(|s| *s == NodeStatus::Running));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Release both hosts
        while !task.is_finished() {
            release.notify_waiters();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let report = task.await.unwrap().unwrap();
        assert!(report.nodes.iter().all(|(_, s)| *s == NodeStatus::Completed));
        assert_eq!(report.progress.nodes_done, 3);
    }

    #[tokio::test]
    async fn test_network_failure_is_could_not_test() {
        let collector = AlertCollector::spawn();
        let scanner = scanner(vec![Arc::new(Sends)], 1, collector.sink());
        let report = scanner
            .scan(vec![node("http://example.test/?a=1&b=2")])
            .await
            .unwrap();

        assert_eq!(report.issues.len(), 2);
        assert!(report.issues.iter().all(|i| i.kind == IssueKind::CouldNotTest));
        assert_eq!(report.nodes[0].1, NodeStatus::Completed);
    }

    #[tokio::test]
    async fn test_stopped_scan_does_no_work() {
        let log: Log = Arc::default();
        let collector = AlertCollector::spawn();
        let scanner = scanner(vec![Arc::new(Scripted::new("scripted", 1, &log))], 1, collector.sink());
        scanner.control().stop();

        let report = scanner
            .scan(vec![node("http://example.test/?a=1"), node("http://example.test/b?c=1")])
            .await
            .unwrap();

        assert!(log.lock().is_empty());
        assert!(report.nodes.iter().all(|(_, s)| *s == NodeStatus::Stopped));
        assert_eq!(report.progress.nodes_done, 0);
    }

    #[tokio::test]
    async fn test_disabled_plugins_are_dropped() {
        let log: Log = Arc::default();
        let collector = AlertCollector::spawn();
        let mut policy = policy(1);
        policy.disable_plugin("scripted");

        let scanner = ActiveScanner::new(
            vec![Arc::new(Scripted::new("scripted", 1, &log))],
            policy,
            Arc::new(Refused),
            RetryPolicy::default(),
            Arc::new(SharedCatalog::new(Catalog::default())),
            collector.sink(),
        );
        assert!(scanner.plugin_keys().is_empty());
    }
}
