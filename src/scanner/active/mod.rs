//! Active security scanner
//!
//! Attack plugins rewrite injection points of captured messages and look
//! for evidence in the responses. Node-scoped plugins run against every
//! node, host-scoped plugins once per host.

pub mod attacks;
mod control;
mod orchestrator;

pub use control::{ScanControl, ScanState};
pub use orchestrator::{ActiveScanner, NodeStatus, ScanProgress, ScanReport};

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::error::{HttpError, ScannerError};
use crate::http::{send_with_retry, HistoryType, HttpMessage, MessageSender, RetryPolicy};
use crate::scanner::policies::PluginConfig;
use crate::scanner::variant::{InjectionPoint, Variant};
use crate::scanner::{Alert, Catalog, Confidence, Risk};

/// Whether a plugin runs per node or once per host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginScope {
    Node,
    Host,
}

/// Plugin grouping; plugins of equal priority run in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PluginCategory {
    Injection,
    Client,
    Server,
    Information,
    Misc,
}

/// Why an attempt produced no verdict
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Network failure: {0}")]
    Network(#[from] HttpError),

    #[error(transparent)]
    Scanner(#[from] ScannerError),

    #[error("{0}")]
    Failed(String),
}

/// Kind of a non-fatal scan problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// The target could not be reached after retries
    CouldNotTest,

    /// The plugin failed or panicked
    PluginFault,
}

/// A unit of work that could not be tested
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanIssue {
    pub kind: IssueKind,
    pub plugin: String,
    pub url: String,
    pub param: Option<String>,
    pub detail: String,
}

/// Everything one plugin needs while attacking one node or host
pub struct AttackContext {
    /// The captured message under attack
    pub base: HttpMessage,

    /// Strength and threshold of the plugin
    pub config: PluginConfig,

    pub catalog: Arc<Catalog>,

    sender: Arc<dyn MessageSender>,
    retry: RetryPolicy,
    delay: Duration,
}

impl AttackContext {
    pub fn new(
        base: HttpMessage,
        config: PluginConfig,
        catalog: Arc<Catalog>,
        sender: Arc<dyn MessageSender>,
        retry: RetryPolicy,
        delay: Duration,
    ) -> Self {
        Self {
            base,
            config,
            catalog,
            sender,
            retry,
            delay,
        }
    }

    /// A fresh copy of the base message to rewrite
    pub fn attack_message(&self) -> HttpMessage {
        let mut message = self.base.clone();
        message.response = None;
        message.response_body.clear();
        message.id = None;
        message.note = None;
        message.history_type = HistoryType::Scanner;
        message
    }

    /// Copy of the base message with `value` written at `point`
    pub fn inject(
        &self,
        variant: &dyn Variant,
        point: &InjectionPoint,
        value: &str,
        escaped: bool,
    ) -> Result<HttpMessage, ScannerError> {
        let mut message = self.attack_message();
        variant.rebuild(&mut message, point, value, escaped)?;
        Ok(message)
    }

    /// Send with the session's timeout, retry budget and request delay
    pub async fn send(&self, message: &mut HttpMessage) -> Result<(), HttpError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        send_with_retry(self.sender.as_ref(), message, self.retry).await
    }

    /// The payloads this plugin's strength allows
    pub fn payloads<'a, T>(&self, all: &'a [T]) -> &'a [T] {
        self.config.strength.select(all)
    }

    /// Catalog alert bound to `message`
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

    /// Response body of the unmodified message
    pub fn base_body(&self) -> String {
        self.base.response_body_text()
    }
}

/// An attack plugin
#[async_trait]
pub trait ActivePlugin: Send + Sync {
    /// Policy key
    fn key(&self) -> &'static str;

    /// Plugin id stamped on raised alerts
    fn plugin_id(&self) -> u32;

    /// Lower runs first
    fn priority(&self) -> u32 {
        100
    }

    fn category(&self) -> PluginCategory;

    fn scope(&self) -> PluginScope {
        PluginScope::Node
    }

    /// Attack one injection point of the base message
    async fn attack_point(
        &self,
        _ctx: &AttackContext,
        _variant: &dyn Variant,
        _point: &InjectionPoint,
    ) -> Result<Vec<Alert>, PluginError> {
        Ok(Vec::new())
    }

    /// Attack the host of the base message
    async fn attack_host(&self, _ctx: &AttackContext) -> Result<Vec<Alert>, PluginError> {
        Ok(Vec::new())
    }
}
