//! Content-Type header analysis

use crate::http::HttpMessage;
use crate::scanner::passive::{AnalyzerContext, PassiveAnalyzer};
use crate::scanner::{Alert, Confidence, Risk};

/// Responses with a body but no declared content type
pub struct ContentTypeAnalyzer;

impl PassiveAnalyzer for ContentTypeAnalyzer {
    fn key(&self) -> &'static str {
        "content-type"
    }

    fn plugin_id(&self) -> u32 {
        10019
    }

    fn scan_response(&self, message: &HttpMessage, ctx: &AnalyzerContext<'_>) -> Vec<Alert> {
        let Some(response) = &message.response else {
            return Vec::new();
        };

        if message.response_body.is_empty() {
            return Vec::new();
        }

        match response.content_type() {
            Some(ct) if !ct.trim().is_empty() => Vec::new(),
            declared => {
                let mut alert = ctx
                    .alert(40, self.plugin_id(), Risk::Info, Confidence::Medium, message)
                    .with_param("Content-Type")
                    .with_cwe(345)
                    .with_wasc(12);
                if declared.is_some() {
                    alert = alert.with_other_info("The Content-Type header is present but empty");
                }
                vec![alert]
            }
        }
    }
}
