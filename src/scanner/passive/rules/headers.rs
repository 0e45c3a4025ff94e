//! Security headers analysis

use crate::http::HttpMessage;
use crate::scanner::passive::{AnalyzerContext, PassiveAnalyzer};
use crate::scanner::{Alert, Confidence, Risk};

/// Missing anti-clickjacking, nosniff, HSTS and CSP headers
pub struct SecurityHeadersAnalyzer;

impl PassiveAnalyzer for SecurityHeadersAnalyzer {
    fn key(&self) -> &'static str {
        "security-headers"
    }

    fn plugin_id(&self) -> u32 {
        10020
    }

    fn scan_response(&self, message: &HttpMessage, ctx: &AnalyzerContext<'_>) -> Vec<Alert> {
        let Some(response) = &message.response else {
            return Vec::new();
        };
        let mut alerts = Vec::new();
        let id = self.plugin_id();

        if response.is_html() {
            let csp: Vec<String> = response
                .header_values("content-security-policy")
                .map(|v| v.to_ascii_lowercase())
                .collect();

            let frame_ancestors = csp.iter().any(|v| v.contains("frame-ancestors"));
            if !frame_ancestors && response.header("x-frame-options").is_none() {
                alerts.push(
                    ctx.alert(10, id, Risk::Medium, Confidence::Medium, message)
                        .with_param("X-Frame-Options")
                        .with_cwe(1021)
                        .with_wasc(15),
                );
            }

            if csp.is_empty() {
                alerts.push(
                    ctx.alert(13, id, Risk::Medium, Confidence::High, message)
                        .with_cwe(693)
                        .with_wasc(15),
                );
            }
        }

        let nosniff = response
            .header("x-content-type-options")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("nosniff"));
        if !nosniff && !message.response_body.is_empty() {
            let mut alert = ctx
                .alert(11, id, Risk::Low, Confidence::Medium, message)
                .with_param("X-Content-Type-Options")
                .with_cwe(693)
                .with_wasc(15);
            if let Some(value) = response.header("x-content-type-options") {
                alert = alert.with_evidence(value);
            }
            alerts.push(alert);
        }

        if message.is_https() && response.header("strict-transport-security").is_none() {
            alerts.push(
                ctx.alert(12, id, Risk::Low, Confidence::High, message)
                    .with_cwe(319)
                    .with_wasc(15),
            );
        }

        alerts
    }
}
