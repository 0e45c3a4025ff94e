//! Error-based SQL injection

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

use super::new_evidence;
use crate::scanner::active::{ActivePlugin, AttackContext, PluginCategory, PluginError};
use crate::scanner::variant::{InjectionPoint, Variant};
use crate::scanner::{Alert, Confidence, Risk};

/// Database error messages and the engine they point at
const SQL_ERROR_PATTERNS: &[(&str, &str)] = &[
    (r"SQL syntax.*MySQL", "MySQL"),
    (r"Warning.*mysql_", "MySQL"),
    (r"valid MySQL result", "MySQL"),
    (r"PostgreSQL.*ERROR", "PostgreSQL"),
    (r"Warning.*\Wpg_", "PostgreSQL"),
    (r"Npgsql\.", "PostgreSQL"),
    (r"Driver.*SQL[\-\_\ ]*Server", "MSSQL"),
    (r"OLE DB.*SQL Server", "MSSQL"),
    (r"Unclosed quotation mark after", "MSSQL"),
    (r"(?s)Exception.*\bSystem\.Data\.SqlClient\.", "MSSQL"),
    (r"ORA-\d{5}", "Oracle"),
    (r"Oracle.*Driver", "Oracle"),
    (r"DB2 SQL error", "DB2"),
    (r"SQLite\.Exception", "SQLite"),
    (r"\[SQLITE_ERROR\]", "SQLite"),
    (r"(?i)quoted string not properly terminated", "Generic"),
    (r"(?i)SQL syntax error", "Generic"),
];

const SQLI_PAYLOADS: &[&str] = &["'", "\"", "')", "' OR '1'='1", "1' AND '1'='2", "';--", "\\", "' UNION SELECT NULL--"];

struct ErrorPatterns {
    regexes: Vec<Regex>,
    engines: Vec<&'static str>,
}

fn error_patterns() -> &'static ErrorPatterns {
    static PATTERNS: OnceLock<ErrorPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let (regexes, engines) = SQL_ERROR_PATTERNS
            .iter()
            .filter_map(|(pattern, engine)| Regex::new(pattern).ok().map(|re| (re, *engine)))
            .unzip();
        ErrorPatterns { regexes, engines }
    })
}

fn engine_for(evidence: &str) -> &'static str {
    let patterns = error_patterns();
    patterns
        .regexes
        .iter()
        .position(|re| re.is_match(evidence))
        .and_then(|i| patterns.engines.get(i).copied())
        .unwrap_or("Generic")
}

/// Database errors provoked by breaking out of a quoted value
pub struct SqlInjectionPlugin;

#[async_trait]
impl ActivePlugin for SqlInjectionPlugin {
    fn key(&self) -> &'static str {
        "sqli"
    }

    fn plugin_id(&self) -> u32 {
        40018
    }

    fn priority(&self) -> u32 {
        20
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

        for payload in ctx.payloads(SQLI_PAYLOADS) {
            let value = format!("{}{}", point.value, payload);
            let mut attack = ctx.inject(variant, point, &value, false)?;
            ctx.send(&mut attack).await?;

            let body = attack.response_body_text();
            if let Some(evidence) = new_evidence(&error_patterns().regexes, &body, &base) {
                let engine = engine_for(evidence);
                tracing::debug!(url = %attack.url_string(), param = %point.name, engine, "SQL error provoked");
                return Ok(vec![ctx
                    .alert(2, self.plugin_id(), Risk::High, Confidence::Medium, &attack)
                    .with_param(&point.name)
                    .with_attack(&value)
                    .with_evidence(evidence)
                    .with_other_info(&format!("Database: {}", engine))
                    .with_cwe(89)
                    .with_wasc(19)]);
            }
        }

        Ok(Vec::new())
    }
}
