//! Anti-CSRF token detection

use crate::http::HttpMessage;
use crate::scanner::passive::{AnalyzerContext, PassiveAnalyzer};
use crate::scanner::{Alert, AlertThreshold, Confidence, Risk};
use crate::spider::{scan_tags, Tag};

const TOKEN_NAMES: &[&str] = &[
    "csrf",
    "xsrf",
    "_token",
    "authenticity_token",
    "__requestverificationtoken",
    "anticsrf",
    "nonce",
];

/// POST forms in HTML responses that carry no recognizable token field
pub struct CsrfAnalyzer {
    token_names: Vec<String>,
}

impl CsrfAnalyzer {
    pub fn new() -> Self {
        Self {
            token_names: TOKEN_NAMES.iter().map(|n| n.to_string()).collect(),
        }
    }

    /// Recognize additional token field names
    pub fn with_token_name(mut self, name: &str) -> Self {
        self.token_names.push(name.to_ascii_lowercase());
        self
    }

    fn is_token_name(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.token_names.iter().any(|t| lower.contains(t.as_str()))
    }
}

impl Default for CsrfAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveAnalyzer for CsrfAnalyzer {
    fn key(&self) -> &'static str {
        "anti-csrf"
    }

    fn plugin_id(&self) -> u32 {
        10202
    }

    fn default_threshold(&self) -> AlertThreshold {
        AlertThreshold::Low
    }

    fn scan_response(&self, message: &HttpMessage, ctx: &AnalyzerContext<'_>) -> Vec<Alert> {
        let Some(response) = &message.response else {
            return Vec::new();
        };
        if !response.is_html() {
            return Vec::new();
        }

        let markup = scan_tags(&message.response_body_text());
        let mut alerts = Vec::new();

        for form in &markup.forms {
            let Tag::Form { name, action, method } = &form.form else {
                continue;
            };
            if !method.eq_ignore_ascii_case("post") {
                continue;
            }

            let protected = form
                .fields
                .iter()
                .any(|field| matches!(field, Tag::Input { .. }) && self.is_token_name(field.name()));
            if protected {
                continue;
            }

            let fields: Vec<&str> = form
                .fields
                .iter()
                .map(|f| f.name())
                .filter(|n| !n.is_empty())
                .collect();

            let mut alert = ctx
                .alert(50, self.plugin_id(), Risk::Medium, Confidence::Low, message)
                .with_evidence(&format!("<form action=\"{}\" method=\"{}\">", action, method))
                .with_other_info(&format!("Form fields: {}", fields.join(", ")))
                .with_cwe(352)
                .with_wasc(9);
            if !name.is_empty() {
                alert = alert.with_param(name);
            }
            alerts.push(alert);
        }

        alerts
    }
}
