//! Passive security scanner
//!
//! Analyzes observed traffic without sending anything. Messages are queued
//! without blocking the caller and analyzed by one task in arrival order.

pub mod rules;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::app::PassiveConfig;
use crate::http::HttpMessage;
use crate::scanner::auth_state::AuthStateDetector;
use crate::scanner::{Alert, AlertSink, AlertThreshold, Catalog, Confidence, Risk, SharedCatalog};
use crate::spider::SpiderListener;

/// What an analyzer can read besides the message
pub struct AnalyzerContext<'a> {
    pub catalog: &'a Catalog,
}

impl AnalyzerContext<'_> {
    /// Catalog alert `vuln_id` bound to `message`
    pub fn alert(
        &self,
        vuln_id: u32,
        plugin_id: u32,
        risk: Risk,
        confidence: Confidence,
        message: &HttpMessage,
    ) -> Alert {
        self.catalog
            .alert(vuln_id, plugin_id, risk, confidence)
            .for_message(message)
    }
}

/// A read-only check over one exchange
pub trait PassiveAnalyzer: Send + Sync {
    /// Configuration key
    fn key(&self) -> &'static str;

    /// Plugin id stamped on raised alerts
    fn plugin_id(&self) -> u32;

    /// Threshold used when the configuration says `DEFAULT`
    fn default_threshold(&self) -> AlertThreshold {
        AlertThreshold::Medium
    }

    /// Inspect the request
    fn scan_request(&self, _message: &HttpMessage, _ctx: &AnalyzerContext<'_>) -> Vec<Alert> {
        Vec::new()
    }

    /// Inspect the response
    fn scan_response(&self, message: &HttpMessage, ctx: &AnalyzerContext<'_>) -> Vec<Alert>;
}

/// The built-in analyzers in dispatch order
pub fn default_analyzers(auth: Option<Arc<AuthStateDetector>>) -> Vec<Arc<dyn PassiveAnalyzer>> {
    let mut analyzers: Vec<Arc<dyn PassiveAnalyzer>> = vec![
        Arc::new(rules::SecurityHeadersAnalyzer),
        Arc::new(rules::CookieSecurityAnalyzer),
        Arc::new(rules::InformationDisclosureAnalyzer::new()),
        Arc::new(rules::ContentTypeAnalyzer),
        Arc::new(rules::CsrfAnalyzer::new()),
    ];
    if let Some(detector) = auth.filter(|d| d.is_configured()) {
        analyzers.push(Arc::new(rules::AuthStateAnalyzer::new(detector)));
    }
    analyzers
}

enum DispatchCommand {
    Message(Box<HttpMessage>),
    Flush(oneshot::Sender<()>),
}

struct ActiveAnalyzer {
    analyzer: Arc<dyn PassiveAnalyzer>,
    threshold: AlertThreshold,
}

/// Non-blocking fan-out of exchanges to passive analyzers
pub struct PassiveScanDispatcher {
    tx: mpsc::UnboundedSender<DispatchCommand>,
    processed: Arc<AtomicUsize>,
}

impl PassiveScanDispatcher {
    /// Start the dispatch task.
    ///
    /// Analyzers disabled in `config` or with an `OFF` threshold are left out.
    pub fn spawn(
        analyzers: Vec<Arc<dyn PassiveAnalyzer>>,
        config: &PassiveConfig,
        catalog: Arc<SharedCatalog>,
        sink: AlertSink,
    ) -> Self {
        let active: Vec<ActiveAnalyzer> = analyzers
            .into_iter()
            .filter_map(|analyzer| {
                let settings = config.analyzers.get(analyzer.key()).copied().unwrap_or_default();
                let threshold = settings.threshold.resolve(analyzer.default_threshold());
                if !settings.enabled || threshold.is_off() {
                    tracing::debug!(analyzer = analyzer.key(), "Passive analyzer disabled");
                    return None;
                }
                Some(ActiveAnalyzer { analyzer, threshold })
            })
            .collect();

        tracing::info!(analyzers = active.len(), "Passive scanner started");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let processed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&processed);

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    DispatchCommand::Message(message) => {
                        let catalog = catalog.current();
                        dispatch(&active, &message, &catalog, &sink);
                        counter.fetch_add(1, Ordering::Relaxed);
                    }
                    DispatchCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });

        Self { tx, processed }
    }

    /// Queue a message for analysis; never blocks
    pub fn submit(&self, message: HttpMessage) {
        if self.tx.send(DispatchCommand::Message(Box::new(message))).is_err() {
            tracing::warn!("Passive scanner has shut down, dropping message");
        }
    }

    /// Wait until every message submitted before this call is analyzed
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(DispatchCommand::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// Messages analyzed so far
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }
}

impl SpiderListener for PassiveScanDispatcher {
    fn on_message(&self, message: &HttpMessage) {
        self.submit(message.clone());
    }
}

fn dispatch(active: &[ActiveAnalyzer], message: &HttpMessage, catalog: &Catalog, sink: &AlertSink) {
    let ctx = AnalyzerContext { catalog };

    for entry in active {
        let analyzer = &entry.analyzer;
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut alerts = analyzer.scan_request(message, &ctx);
            if message.has_response() {
                alerts.extend(analyzer.scan_response(message, &ctx));
            }
            alerts
        }));

        match result {
            Ok(alerts) => {
                for alert in alerts {
                    if entry.threshold.permits(alert.confidence) {
                        sink.raise(alert);
                    } else {
                        tracing::trace!(
                            analyzer = analyzer.key(),
                            confidence = alert.confidence.as_str(),
                            "Alert below threshold"
                        );
                    }
                }
            }
            Err(_) => {
                tracing::warn!(
                    analyzer = analyzer.key(),
                    url = %message.url_string(),
                    "Passive analyzer panicked, skipping"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AnalyzerConfig;
    use crate::http::ResponseHeader;
    use crate::scanner::AlertCollector;
    use parking_lot::Mutex;

    /// Raises one alert of a fixed confidence per response
    struct Fixed {
        key: &'static str,
        confidence: Confidence,
    }

    impl PassiveAnalyzer for Fixed {
        fn key(&self) -> &'static str {
            self.key
        }

        fn plugin_id(&self) -> u32 {
            90000
        }

        fn scan_response(&self, message: &HttpMessage, _ctx: &AnalyzerContext<'_>) -> Vec<Alert> {
            vec![Alert::new(self.plugin_id(), self.key, Risk::Low, self.confidence).for_message(message)]
        }
    }

    struct Panics;

    impl PassiveAnalyzer for Panics {
        fn key(&self) -> &'static str {
            "panics"
        }

        fn plugin_id(&self) -> u32 {
            90001
        }

        fn scan_response(&self, _message: &HttpMessage, _ctx: &AnalyzerContext<'_>) -> Vec<Alert> {
            panic!("analyzer bug")
        }
    }

    /// Records the order messages arrive in
    struct Order(Mutex<Vec<String>>);

    impl PassiveAnalyzer for Order {
        fn key(&self) -> &'static str {
            "order"
        }

        fn plugin_id(&self) -> u32 {
            90002
        }

        fn scan_response(&self, message: &HttpMessage, _ctx: &AnalyzerContext<'_>) -> Vec<Alert> {
            self.0.lock().push(message.request.uri.clone());
            Vec::new()
        }
    }

    fn message(path: &str) -> HttpMessage {
        let mut msg = HttpMessage::get(&format!("http://example.test{}", path)).unwrap();
        msg.set_response(ResponseHeader::new(200, "OK"), b"ok".to_vec());
        msg
    }

    fn config(key: &str, threshold: AlertThreshold) -> PassiveConfig {
        let mut config = PassiveConfig::default();
        config.analyzers.insert(
            key.to_string(),
            AnalyzerConfig {
                enabled: true,
                threshold,
            },
        );
        config
    }

    async fn run(analyzers: Vec<Arc<dyn PassiveAnalyzer>>, config: &PassiveConfig) -> AlertCollector {
        let collector = AlertCollector::spawn();
        let catalog = Arc::new(SharedCatalog::new(Catalog::default()));
        let dispatcher = PassiveScanDispatcher::spawn(analyzers, config, catalog, collector.sink());

        dispatcher.submit(message("/"));
        dispatcher.flush().await;
        assert_eq!(dispatcher.processed(), 1);
        collector.flush().await;
        collector
    }

    #[tokio::test]
    async fn test_off_threshold_reports_nothing_low_reports_low_confidence() {
        let analyzer = || -> Arc<dyn PassiveAnalyzer> {
            Arc::new(Fixed {
                key: "fixed",
                confidence: Confidence::Low,
            })
        };

        let off = run(vec![analyzer()], &config("fixed", AlertThreshold::Off)).await;
        assert!(off.is_empty());

        let low = run(vec![analyzer()], &config("fixed", AlertThreshold::Low)).await;
        assert_eq!(low.len(), 1);

        let medium = run(vec![analyzer()], &config("fixed", AlertThreshold::Medium)).await;
        assert!(medium.is_empty());

        let high = Arc::new(Fixed {
            key: "fixed",
            confidence: Confidence::High,
        });
        let strict = run(vec![high], &config("fixed", AlertThreshold::High)).await;
        assert_eq!(strict.len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_analyzer_is_skipped() {
        let mut config = PassiveConfig::default();
        config.analyzers.insert(
            "fixed".to_string(),
            AnalyzerConfig {
                enabled: false,
                threshold: AlertThreshold::Low,
            },
        );
        let analyzer = Arc::new(Fixed {
            key: "fixed",
            confidence: Confidence::High,
        });
        assert!(run(vec![analyzer], &config).await.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_analyzer_is_isolated() {
        let analyzers: Vec<Arc<dyn PassiveAnalyzer>> = vec![
            Arc::new(Panics),
            Arc::new(Fixed {
                key: "fixed",
                confidence: Confidence::High,
            }),
        ];
        let collector = run(analyzers, &PassiveConfig::default()).await;
        assert_eq!(collector.len(), 1);
    }

    #[tokio::test]
    async fn test_messages_are_analyzed_in_arrival_order() {
        let order = Arc::new(Order(Mutex::new(Vec::new())));
        let collector = AlertCollector::spawn();
        let catalog = Arc::new(SharedCatalog::new(Catalog::default()));
        let dispatcher = PassiveScanDispatcher::spawn(
            vec![order.clone() as Arc<dyn PassiveAnalyzer>],
            &PassiveConfig::default(),
            catalog,
            collector.sink(),
        );

        for i in 0..50 {
            dispatcher.on_message(&message(&format!("/{}", i)));
        }
        dispatcher.flush().await;

        let seen = order.0.lock().clone();
        let expected: Vec<String> = (0..50).map(|i| format!("http://example.test/{}", i)).collect();
        assert_eq!(seen, expected);
    }
}
