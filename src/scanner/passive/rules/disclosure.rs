//! Information disclosure detection

use regex::Regex;

use crate::http::HttpMessage;
use crate::scanner::passive::{AnalyzerContext, PassiveAnalyzer};
use crate::scanner::{Alert, Confidence, Risk};

const ERROR_PATTERNS: &[&str] = &[
    r"(?m)^\s*at\s+[\w.$]+\([\w.]+\.java:\d+\)",
    r"Traceback \(most recent call last\)",
    r"(?i)\b(?:fatal error|parse error|warning)\b:.{0,200}? on line \d+",
    r"(?i)you have an error in your sql syntax",
    r"ORA-\d{5}",
    r"(?i)unclosed quotation mark after the character string",
    r"(?i)\bpg_query\(\)|\bmysql_fetch_\w+\(\)",
    r"(?i)microsoft ole db provider for odbc drivers",
    r"System\.\w+Exception:",
];

const PRIVATE_IP: &str =
    r"\b(?:10\.\d{1,3}\.\d{1,3}\.\d{1,3}|172\.(?:1[6-9]|2\d|3[01])\.\d{1,3}\.\d{1,3}|192\.168\.\d{1,3}\.\d{1,3})\b";

/// Version banners, error messages and internal addresses in responses
pub struct InformationDisclosureAnalyzer {
    errors: Vec<Regex>,
    private_ip: Option<Regex>,
}

impl InformationDisclosureAnalyzer {
    pub fn new() -> Self {
        Self {
            errors: ERROR_PATTERNS.iter().filter_map(|p| Regex::new(p).ok()).collect(),
            private_ip: Regex::new(PRIVATE_IP).ok(),
        }
    }
}

impl Default for InformationDisclosureAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveAnalyzer for InformationDisclosureAnalyzer {
    fn key(&self) -> &'static str {
        "information-disclosure"
    }

    fn plugin_id(&self) -> u32 {
        10036
    }

    fn scan_response(&self, message: &HttpMessage, ctx: &AnalyzerContext<'_>) -> Vec<Alert> {
        let Some(response) = &message.response else {
            return Vec::new();
        };
        let mut alerts = Vec::new();
        let id = self.plugin_id();

        if let Some(server) = response.header("server") {
            if server.chars().any(|c| c.is_ascii_digit()) {
                alerts.push(
                    ctx.alert(30, id, Risk::Low, Confidence::High, message)
                        .with_param("Server")
                        .with_evidence(server)
                        .with_cwe(200)
                        .with_wasc(13),
                );
            }
        }

        for powered_by in response.header_values("x-powered-by") {
            alerts.push(
                ctx.alert(31, id, Risk::Low, Confidence::Medium, message)
                    .with_param("X-Powered-By")
                    .with_evidence(powered_by)
                    .with_cwe(200)
                    .with_wasc(13),
            );
        }

        if !response.is_text() || message.response_body.is_empty() {
            return alerts;
        }
        let body = message.response_body_text();

        if let Some(found) = self.errors.iter().find_map(|p| p.find(&body)) {
            alerts.push(
                ctx.alert(32, id, Risk::Medium, Confidence::Medium, message)
                    .with_evidence(found.as_str())
                    .with_cwe(209)
                    .with_wasc(13),
            );
        }

        if let Some(pattern) = &self.private_ip {
            // Addresses the client already used to reach the target are not news
            let host = message.url().ok().and_then(|u| u.host_str().map(String::from));
            if let Some(found) = pattern
                .find_iter(&body)
                .find(|m| host.as_deref() != Some(m.as_str()))
            {
                alerts.push(
                    ctx.alert(33, id, Risk::Low, Confidence::Medium, message)
                        .with_evidence(found.as_str())
                        .with_cwe(200)
                        .with_wasc(13),
                );
            }
        }

        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ResponseHeader;
    use crate::scanner::passive::rules::test_support::{exchange, names, scan};

    #[test]
    fn test_all_patterns_compile() {
        let analyzer = InformationDisclosureAnalyzer::new();
        assert_eq!(analyzer.errors.len(), ERROR_PATTERNS.len());
        assert!(analyzer.private_ip.is_some());
    }

    #[test]
    fn test_banners() {
        let msg = exchange(
            "http://example.test/",
            ResponseHeader::new(200, "OK")
                .with_header("Server", "Apache/2.4.41 (Ubuntu)")
                .with_header("X-Powered-By", "PHP/7.4.3"),
            "",
        );
        let alerts = scan(&InformationDisclosureAnalyzer::new(), &msg);
        assert_eq!(
            names(&alerts),
            vec!["Server Leaks Version Information", "X-Powered-By Header Information Leak"]
        );
        assert_eq!(alerts[0].evidence.as_deref(), Some("Apache/2.4.41 (Ubuntu)"));

        let plain = exchange(
            "http://example.test/",
            ResponseHeader::new(200, "OK").with_header("Server", "nginx"),
            "",
        );
        assert!(scan(&InformationDisclosureAnalyzer::new(), &plain).is_empty());
    }

    #[test]
    fn test_error_and_private_ip_in_body() {
        let msg = exchange(
            "http://example.test/item?id=1'",
            ResponseHeader::new(500, "Internal Server Error").with_header("Content-Type", "text/html"),
            "You have an error in your SQL syntax near ''' at line 1. Backend 10.0.12.7 failed.",
        );
        let alerts = scan(&InformationDisclosureAnalyzer::new(), &msg);
        assert_eq!(names(&alerts), vec!["Application Error Disclosure", "Private IP Disclosure"]);
        assert_eq!(alerts[1].evidence.as_deref(), Some("10.0.12.7"));
    }

    #[test]
    fn test_own_private_host_is_ignored_and_binary_skipped() {
        let msg = exchange(
            "http://192.168.1.10/",
            ResponseHeader::new(200, "OK").with_header("Content-Type", "text/plain"),
            "served by 192.168.1.10",
        );
        assert!(scan(&InformationDisclosureAnalyzer::new(), &msg).is_empty());

        let image = exchange(
            "http://example.test/a.png",
            ResponseHeader::new(200, "OK").with_header("Content-Type", "image/png"),
            "10.0.0.1",
        );
        assert!(scan(&InformationDisclosureAnalyzer::new(), &image).is_empty());
    }
}
