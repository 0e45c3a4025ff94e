//! Publicly readable configuration and VCS files

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

use crate::http::HttpMessage;
use crate::scanner::active::{ActivePlugin, AttackContext, PluginCategory, PluginError, PluginScope};
use crate::scanner::{Alert, Confidence, Risk};

/// Path requested on the host and the content that proves it is the real file
const CANDIDATES: &[(&str, &str)] = &[
    ("/.git/HEAD", r"^ref: refs/heads/\S+"),
    ("/.env", r"(?m)^[A-Z][A-Z0-9_]*=\S*"),
    ("/.git/config", r"\[core\]"),
    ("/.htpasswd", r"(?m)^[\w.-]+:\$(apr1|2y|1)\$"),
    ("/.svn/entries", r"^(\d+\s*$|<\?xml)"),
    ("/.DS_Store", r"^\x00\x00\x00\x01Bud1"),
    ("/wp-config.php.bak", r"DB_PASSWORD"),
    ("/server-status", r"Apache Server Status"),
];

fn candidates() -> &'static [(&'static str, Regex)] {
    static COMPILED: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        CANDIDATES
            .iter()
            .filter_map(|(path, sig)| Regex::new(sig).ok().map(|re| (*path, re)))
            .collect()
    })
}

/// Checks each host once for files that should never be served
pub struct SensitiveFilesPlugin;

impl SensitiveFilesPlugin {
    fn candidate_request(ctx: &AttackContext, origin: &str, path: &str) -> HttpMessage {
        let mut message = ctx.attack_message();
        message.request.method = "GET".to_string();
        message.request.uri = format!("{}{}", origin, path);
        message.request.remove_header("Content-Type");
        message.request.remove_header("Content-Length");
        message.request_body.clear();
        message
    }
}

#[async_trait]
impl ActivePlugin for SensitiveFilesPlugin {
    fn key(&self) -> &'static str {
        "sensitive_files"
    }

    fn plugin_id(&self) -> u32 {
        10095
    }

    fn priority(&self) -> u32 {
        50
    }

    fn category(&self) -> PluginCategory {
        PluginCategory::Information
    }

    fn scope(&self) -> PluginScope {
        PluginScope::Host
    }

    async fn attack_host(&self, ctx: &AttackContext) -> Result<Vec<Alert>, PluginError> {
        let Some(origin) = ctx.base.origin() else {
            return Ok(Vec::new());
        };

        let mut alerts = Vec::new();
        for (path, signature) in ctx.payloads(candidates()) {
            let mut request = Self::candidate_request(ctx, &origin, path);
            ctx.send(&mut request).await?;
            if request.status() != Some(200) {
                continue;
            }

            let body = request.response_body_text();
            if let Some(found) = signature.find(&body) {
                tracing::debug!(url = %request.url_string(), "Sensitive file served");
                alerts.push(
                    ctx.alert(5, self.plugin_id(), Risk::Medium, Confidence::High, &request)
                        .with_attack(path)
                        .with_evidence(found.as_str())
                        .with_cwe(538)
                        .with_wasc(13),
                );
            }
        }

        Ok(alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::active::attacks::test_support::context;

    #[tokio::test]
    async fn test_exposed_git_head() {
        let ctx = context("https://example.test/shop/cart?item=1", "", |msg| {
            match msg.request.uri.as_str() {
                "https://example.test/.git/HEAD" => (200, "ref: refs/heads/main\n".to_string()),
                "https://example.test/.env" => (200, "<html>Welcome</html>".to_string()),
                _ => (404, "missing".to_string()),
            }
        });
        let alerts = SensitiveFilesPlugin.attack_host(&ctx).await.unwrap();

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].name, "Sensitive File Exposure");
        assert_eq!(alerts[0].uri, "https://example.test/.git/HEAD");
        assert_eq!(alerts[0].evidence.as_deref(), Some("ref: refs/heads/main"));
    }

    #[tokio::test]
    async fn test_candidate_request_drops_the_base_body() {
        let ctx = context("http://example.test/login", "", |msg| {
            assert_eq!(msg.request.method, "GET");
            assert!(msg.request_body.is_empty());
            (404, String::new())
        });
        assert!(SensitiveFilesPlugin.attack_host(&ctx).await.unwrap().is_empty());
    }
}
