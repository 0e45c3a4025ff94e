//! Cookie security analysis

use crate::http::{Cookie, HttpMessage};
use crate::scanner::passive::{AnalyzerContext, PassiveAnalyzer};
use crate::scanner::{Alert, Confidence, Risk};

/// HttpOnly, Secure and SameSite flags of `Set-Cookie` headers
pub struct CookieSecurityAnalyzer;

impl PassiveAnalyzer for CookieSecurityAnalyzer {
    fn key(&self) -> &'static str {
        "cookie-security"
    }

    fn plugin_id(&self) -> u32 {
        10010
    }

    fn scan_response(&self, message: &HttpMessage, ctx: &AnalyzerContext<'_>) -> Vec<Alert> {
        let Some(response) = &message.response else {
            return Vec::new();
        };
        let mut alerts = Vec::new();
        let id = self.plugin_id();
        let https = message.is_https();

        for raw in response.header_values("set-cookie") {
            let Some(cookie) = Cookie::parse(raw) else {
                continue;
            };
            // Deletions carry no value worth protecting
            if cookie.value.is_empty() {
                continue;
            }

            let evidence = format!("Set-Cookie: {}", raw);

            if !cookie.http_only {
                alerts.push(
                    ctx.alert(20, id, Risk::Low, Confidence::Medium, message)
                        .with_param(&cookie.name)
                        .with_evidence(&evidence)
                        .with_cwe(1004)
                        .with_wasc(13),
                );
            }

            if https && !cookie.secure {
                alerts.push(
                    ctx.alert(21, id, Risk::Low, Confidence::Medium, message)
                        .with_param(&cookie.name)
                        .with_evidence(&evidence)
                        .with_cwe(614)
                        .with_wasc(13),
                );
            }

            match cookie.same_site.as_deref().map(str::to_ascii_lowercase).as_deref() {
                None => alerts.push(
                    ctx.alert(22, id, Risk::Low, Confidence::Medium, message)
                        .with_param(&cookie.name)
                        .with_evidence(&evidence)
                        .with_cwe(1275)
                        .with_wasc(13),
                ),
                Some("none") if !cookie.secure => alerts.push(
                    ctx.alert(22, id, Risk::Low, Confidence::Medium, message)
                        .with_param(&cookie.name)
                        .with_evidence(&evidence)
                        .with_other_info("SameSite=None without Secure is rejected by browsers")
                        .with_cwe(1275)
                        .with_wasc(13),
                ),
                _ => {}
            }
        }

        alerts
    }
}
