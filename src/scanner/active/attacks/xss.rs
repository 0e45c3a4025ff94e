//! Reflected cross-site scripting

use async_trait::async_trait;

use crate::scanner::active::{ActivePlugin, AttackContext, PluginCategory, PluginError};
use crate::scanner::variant::{InjectionPoint, Variant};
use crate::scanner::{Alert, Confidence, Risk};

const XSS_PAYLOADS: &[&str] = &[
    "<script>alert(1)</script>",
    "\"><script>alert(1)</script>",
    "<img src=x onerror=alert(1)>",
    "'\"><svg onload=alert(1)>",
    "</title><script>alert(1)</script>",
    "</textarea><script>alert(1)</script>",
    "<details open ontoggle=alert(1)>",
    "\";alert(1);//",
];

/// Payloads reflected unencoded in the response
pub struct XssPlugin;

impl XssPlugin {
    fn marker() -> String {
        format!("hrw{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
    }
}

#[async_trait]
impl ActivePlugin for XssPlugin {
    fn key(&self) -> &'static str {
        "xss"
    }

    fn plugin_id(&self) -> u32 {
        40012
    }

    fn priority(&self) -> u32 {
        10
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
        // Payloads are only worth sending where a plain marker comes back
        let marker = Self::marker();
        let mut marked = ctx.inject(variant, point, &marker, false)?;
        ctx.send(&mut marked).await?;
        if !marked.response_body_text().contains(&marker) {
            return Ok(Vec::new());
        }

        let base = ctx.base_body();
        for payload in ctx.payloads(XSS_PAYLOADS) {
            if base.contains(payload) {
                continue;
            }

            let mut attack = ctx.inject(variant, point, payload, false)?;
            ctx.send(&mut attack).await?;
            if attack.response_body_text().contains(payload) {
                tracing::debug!(url = %attack.url_string(), param = %point.name, "Payload reflected");
                return Ok(vec![ctx
                    .alert(1, self.plugin_id(), Risk::High, Confidence::Medium, &attack)
                    .with_param(&point.name)
                    .with_attack(payload)
                    .with_evidence(payload)
                    .with_other_info(&format!("Injected into {}", point.kind))
                    .with_cwe(79)
                    .with_wasc(8)]);
            }
        }

        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::active::attacks::test_support::{attack_query, context, query_value};

    fn escape(value: &str) -> String {
        value.replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
    }

    #[tokio::test]
    async fn test_reflected_payload() {
        let ctx = context("http://example.test/search?q=shoes&page=1", "<p>shoes</p>", |msg| {
            (200, format!("<p>Results for {}</p>", query_value(msg, "q")))
        });
        let alerts = attack_query(&XssPlugin, &ctx).await;

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].name, "Cross Site Scripting (Reflected)");
        assert_eq!(alerts[0].param.as_deref(), Some("q"));
        assert_eq!(alerts[0].attack.as_deref(), Some(XSS_PAYLOADS[0]));
        assert_eq!(alerts[0].risk, Risk::High);
    }

    #[tokio::test]
    async fn test_encoded_reflection_is_clean() {
        let ctx = context("http://example.test/search?q=shoes", "", |msg| {
            (200, format!("<p>{}</p>", escape(&query_value(msg, "q"))))
        });
        assert!(attack_query(&XssPlugin, &ctx).await.is_empty());
    }

    #[tokio::test]
    async fn test_no_reflection_sends_only_the_marker() {
        let sent = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = std::sync::Arc::clone(&sent);
        let ctx = context("http://example.test/search?q=shoes", "", move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            (200, "static".to_string())
        });

        assert!(attack_query(&XssPlugin, &ctx).await.is_empty());
        assert_eq!(sent.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
