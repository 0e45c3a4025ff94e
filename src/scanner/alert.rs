//! Alerts and the per-session alert aggregator

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::threshold::{Confidence, Risk};
use crate::http::{HistoryId, HttpMessage};

/// A security finding raised by a passive analyzer or an active plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique ID
    pub id: Uuid,

    /// Analyzer or plugin that raised it
    pub plugin_id: u32,

    /// Alert title
    pub name: String,

    /// Risk level
    pub risk: Risk,

    /// Confidence level
    pub confidence: Confidence,

    /// Description of the vulnerability
    pub description: String,

    /// Evidence found in the response
    pub evidence: Option<String>,

    /// Remediation advice
    pub solution: String,

    /// References/links
    pub references: Vec<String>,

    /// Affected parameter (if applicable)
    pub param: Option<String>,

    /// Payload that triggered it (active scan only)
    pub attack: Option<String>,

    /// Extra detail
    pub other_info: Option<String>,

    /// URL where the vulnerability was found
    pub uri: String,

    /// HTTP method
    pub method: String,

    /// CWE ID (if applicable)
    pub cwe_id: Option<u32>,

    /// WASC ID (if applicable)
    pub wasc_id: Option<u32>,

    /// Message the alert was raised on
    pub message_id: Option<HistoryId>,

    /// When the alert was raised
    pub timestamp: DateTime<Utc>,

    /// Further occurrences merged into this alert
    pub other_instances: usize,
}

impl Alert {
    /// Create a new alert
    pub fn new(plugin_id: u32, name: &str, risk: Risk, confidence: Confidence) -> Self {
        Self {
            id: Uuid::new_v4(),
            plugin_id,
            name: name.to_string(),
            risk,
            confidence,
            description: String::new(),
            evidence: None,
            solution: String::new(),
            references: Vec::new(),
            param: None,
            attack: None,
            other_info: None,
            uri: String::new(),
            method: "GET".to_string(),
            cwe_id: None,
            wasc_id: None,
            message_id: None,
            timestamp: Utc::now(),
            other_instances: 0,
        }
    }

    /// Builder pattern methods
    pub fn for_message(mut self, message: &HttpMessage) -> Self {
        self.uri = message.url_string();
        self.method = message.request.method.clone();
        self.message_id = message.id;
        self
    }

    pub fn with_uri(mut self, uri: &str) -> Self {
        self.uri = uri.to_string();
        self
    }

    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = desc.to_string();
        self
    }

    pub fn with_solution(mut self, solution: &str) -> Self {
        self.solution = solution.to_string();
        self
    }

    pub fn with_reference(mut self, reference: &str) -> Self {
        self.references.push(reference.to_string());
        self
    }

    pub fn with_param(mut self, param: &str) -> Self {
        self.param = Some(param.to_string());
        self
    }

    pub fn with_attack(mut self, attack: &str) -> Self {
        self.attack = Some(attack.to_string());
        self
    }

    pub fn with_evidence(mut self, evidence: &str) -> Self {
        self.evidence = Some(evidence.to_string());
        self
    }

    pub fn with_other_info(mut self, info: &str) -> Self {
        self.other_info = Some(info.to_string());
        self
    }

    pub fn with_cwe(mut self, cwe_id: u32) -> Self {
        self.cwe_id = Some(cwe_id);
        self
    }

    pub fn with_wasc(mut self, wasc_id: u32) -> Self {
        self.wasc_id = Some(wasc_id);
        self
    }

    /// Identity used to merge repeated occurrences
    fn merge_key(&self) -> MergeKey {
        (
            self.plugin_id,
            self.name.clone(),
            self.uri.clone(),
            self.param.clone(),
        )
    }
}

/// Plugin ID, name, URI and parameter
type MergeKey = (u32, String, String, Option<String>);

enum CollectorCommand {
    Raise(Alert),
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle analyzers and plugins raise alerts through
#[derive(Clone)]
pub struct AlertSink {
    tx: mpsc::UnboundedSender<CollectorCommand>,
}

impl AlertSink {
    /// Queue an alert; never blocks
    pub fn raise(&self, alert: Alert) {
        if self.tx.send(CollectorCommand::Raise(alert)).is_err() {
            tracing::warn!("Alert collector has shut down, dropping alert");
        }
    }
}

/// Append-only alert set of one scan session.
///
/// A single aggregator task owns all writes; readers get snapshots.
pub struct AlertCollector {
    tx: mpsc::UnboundedSender<CollectorCommand>,
    alerts: Arc<RwLock<Vec<Alert>>>,
}

impl AlertCollector {
    /// Start the aggregator task on the current runtime
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let alerts = Arc::new(RwLock::new(Vec::<Alert>::new()));

        let store = Arc::clone(&alerts);
        tokio::spawn(async move {
            // Position in the alert list of each distinct alert
            let mut index: HashMap<MergeKey, usize> = HashMap::new();

            while let Some(command) = rx.recv().await {
                match command {
                    CollectorCommand::Raise(alert) => {
                        let key = alert.merge_key();
                        let mut alerts = store.write();
                        match index.get(&key).copied() {
                            Some(position) => alerts[position].other_instances += 1,
                            None => {
                                index.insert(key, alerts.len());
                                tracing::info!(
                                    plugin_id = alert.plugin_id,
                                    name = %alert.name,
                                    risk = alert.risk.as_str(),
                                    uri = %alert.uri,
                                    "Alert raised"
                                );
                                alerts.push(alert);
                            }
                        }
                    }
                    CollectorCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });

        Self { tx, alerts }
    }

    /// Handle for raising alerts
    pub fn sink(&self) -> AlertSink {
        AlertSink {
            tx: self.tx.clone(),
        }
    }

    /// Wait until every alert raised before this call is recorded
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(CollectorCommand::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// All alerts recorded so far
    pub fn snapshot(&self) -> Vec<Alert> {
        self.alerts.read().clone()
    }

    /// Alerts raised on one message
    pub fn alerts_for(&self, message_id: HistoryId) -> Vec<Alert> {
        self.alerts
            .read()
            .iter()
            .filter(|a| a.message_id == Some(message_id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.read().is_empty()
    }
}
