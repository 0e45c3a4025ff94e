use std::sync::Arc;

use crate::http::HttpMessage;
use crate::scanner::auth_state::AuthStateDetector;
use crate::scanner::passive::{AnalyzerContext, PassiveAnalyzer};
use crate::scanner::{Alert, AlertThreshold, Confidence, Risk};

/// Informational alert whenever a logged-in or logged-out indicator matches
pub struct AuthStateAnalyzer {
    detector: Arc<AuthStateDetector>,
}

impl AuthStateAnalyzer {
    pub fn new(detector: Arc<AuthStateDetector>) -> Self {
        Self { detector }
    }
}

impl PassiveAnalyzer for AuthStateAnalyzer {
    fn key(&self) -> &'static str {
        "auth-state"
    }

    fn plugin_id(&self) -> u32 {
        10111
    }

    fn default_threshold(&self) -> AlertThreshold {
        AlertThreshold::Low
    }

    fn scan_response(&self, message: &HttpMessage, ctx: &AnalyzerContext<'_>) -> Vec<Alert> {
        self.detector
            .evaluate(message)
            .into_iter()
            .map(|found| {
                ctx.alert(60, self.plugin_id(), Risk::Info, Confidence::High, message)
                    .with_evidence(&found.evidence)
                    .with_other_info(found.signal.as_str())
            })
            .collect()
    }
}
