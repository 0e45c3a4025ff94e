//! Passive scan rules

mod auth_state;
mod content_type;
mod cookies;
mod csrf;
mod disclosure;
mod headers;

pub use auth_state::AuthStateAnalyzer;
pub use content_type::ContentTypeAnalyzer;
pub use cookies::CookieSecurityAnalyzer;
pub use csrf::CsrfAnalyzer;
pub use disclosure::InformationDisclosureAnalyzer;
pub use headers::SecurityHeadersAnalyzer;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::http::{HttpMessage, ResponseHeader};
    use crate::scanner::passive::{AnalyzerContext, PassiveAnalyzer};
    use crate::scanner::{Alert, Catalog};

    pub fn exchange(url: &str, response: ResponseHeader, body: &str) -> HttpMessage {
        let mut msg = HttpMessage::get(url).unwrap();
        msg.set_response(response, body.as_bytes().to_vec());
        msg
    }

    pub fn scan(analyzer: &dyn PassiveAnalyzer, message: &HttpMessage) -> Vec<Alert> {
        let catalog = Catalog::bundled().unwrap();
        let ctx = AnalyzerContext { catalog: &catalog };
        let mut alerts = analyzer.scan_request(message, &ctx);
        alerts.extend(analyzer.scan_response(message, &ctx));
        alerts
    }

    pub fn names(alerts: &[Alert]) -> Vec<&str> {
        alerts.iter().map(|a| a.name.as_str()).collect()
    }
}
