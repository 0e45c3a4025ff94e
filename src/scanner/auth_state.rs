//! Authentication state indicators
//!
//! The logged-in and logged-out patterns are independent signals: a
//! response may match either, both or neither.

use regex::Regex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::app::AuthIndicatorConfig;
use crate::error::ConfigError;
use crate::http::HttpMessage;

/// Which indicator matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSignal {
    LoggedIn,
    LoggedOut,
}

impl AuthSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthSignal::LoggedIn => "logged in",
            AuthSignal::LoggedOut => "logged out",
        }
    }
}

/// A matched indicator and the text it matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthMatch {
    pub signal: AuthSignal,
    pub evidence: String,
}

/// Evaluates the configured indicators against responses
#[derive(Debug, Default)]
pub struct AuthStateDetector {
    logged_in: Option<Regex>,
    logged_out: Option<Regex>,
    logged_in_hits: AtomicUsize,
    logged_out_hits: AtomicUsize,
}

impl AuthStateDetector {
    pub fn new(logged_in: Option<&str>, logged_out: Option<&str>) -> Result<Self, ConfigError> {
        Ok(Self {
            logged_in: logged_in.map(compile).transpose()?,
            logged_out: logged_out.map(compile).transpose()?,
            ..Self::default()
        })
    }

    pub fn from_config(config: &AuthIndicatorConfig) -> Result<Self, ConfigError> {
        Self::new(
            config.logged_in_indicator.as_deref(),
            config.logged_out_indicator.as_deref(),
        )
    }

    /// Whether any indicator is set
    pub fn is_configured(&self) -> bool {
        self.logged_in.is_some() || self.logged_out.is_some()
    }

    /// Match both indicators against the response head and body
    pub fn evaluate(&self, message: &HttpMessage) -> Vec<AuthMatch> {
        let Some(response) = &message.response else {
            return Vec::new();
        };

        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&response.to_bytes()),
            message.response_body_text()
        );

        let mut matches = Vec::new();
        for (signal, pattern, hits) in [
            (AuthSignal::LoggedIn, &self.logged_in, &self.logged_in_hits),
            (AuthSignal::LoggedOut, &self.logged_out, &self.logged_out_hits),
        ] {
            if let Some(found) = pattern.as_ref().and_then(|p| p.find(&text)) {
                hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(signal = signal.as_str(), url = %message.url_string(), "Auth indicator matched");
                matches.push(AuthMatch {
                    signal,
                    evidence: found.as_str().to_string(),
                });
            }
        }

        matches
    }

    /// Responses that matched (logged in, logged out) so far
    pub fn counts(&self) -> (usize, usize) {
        (
            self.logged_in_hits.load(Ordering::Relaxed),
            self.logged_out_hits.load(Ordering::Relaxed),
        )
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ResponseHeader;

    fn response(body: &str) -> HttpMessage {
        let mut msg = HttpMessage::get("http://example.test/account").unwrap();
        msg.set_response(
            ResponseHeader::new(200, "OK").with_header("Content-Type", "text/html"),
            body.as_bytes().to_vec(),
        );
        msg
    }

    #[test]
    fn test_signals_are_independent() {
        let detector = AuthStateDetector::new(Some(r"Log ?out"), Some(r"Sign in")).unwrap();

        let both = detector.evaluate(&response("<a>Logout</a> or <a>Sign in</a> as someone else"));
        assert_eq!(both.len(), 2);
        assert_eq!(both[0].signal, AuthSignal::LoggedIn);
        assert_eq!(both[0].evidence, "Logout");
        assert_eq!(both[1].signal, AuthSignal::LoggedOut);

        assert!(detector.evaluate(&response("nothing here")).is_empty());
        assert_eq!(detector.counts(), (1, 1));
    }

    #[test]
    fn test_headers_are_matched() {
        let detector = AuthStateDetector::new(None, Some("(?i)location: /login")).unwrap();
        let mut msg = HttpMessage::get("http://example.test/").unwrap();
        msg.set_response(ResponseHeader::new(302, "Found").with_header("Location", "/login"), Vec::new());

        let found = detector.evaluate(&msg);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].signal, AuthSignal::LoggedOut);
    }

    #[test]
    fn test_unconfigured_and_invalid() {
        let detector = AuthStateDetector::default();
        assert!(!detector.is_configured());
        assert!(detector.evaluate(&response("Logout")).is_empty());

        assert!(matches!(
            AuthStateDetector::new(Some("(unclosed"), None),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }
}
