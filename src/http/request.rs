//! HTTP request header

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::HttpError;

/// Request line and headers of one exchange.
///
/// Headers are kept as an ordered list so a message serializes back to the
/// exact bytes it was captured with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    /// HTTP method
    pub method: String,

    /// Raw request-URI, absolute (`http://host/path?q`) or origin form (`/path?q`)
    pub uri: String,

    /// HTTP version, e.g. `HTTP/1.1`
    pub version: String,

    /// Headers in wire order
    pub headers: Vec<(String, String)>,

    /// Sent over TLS; origin-form URIs then resolve to `https`
    #[serde(default)]
    pub secure: bool,
}

impl RequestHeader {
    /// Create a request header for a method and URI
    pub fn new(method: &str, uri: &str) -> Self {
        let mut header = Self {
            method: method.to_uppercase(),
            uri: uri.to_string(),
            version: "HTTP/1.1".to_string(),
            headers: Vec::new(),
            secure: false,
        };

        if let Ok(url) = Url::parse(uri) {
            header.secure = url.scheme() == "https";
            if let Some(host) = url.host_str() {
                let host = match url.port() {
                    Some(port) => format!("{}:{}", host, port),
                    None => host.to_string(),
                };
                header.headers.push(("Host".to_string(), host));
            }
        }

        header
    }

    /// Parse a raw request head (request line plus header lines)
    pub fn parse(raw: &str) -> Result<Self, HttpError> {
        let mut lines = raw.split("\r\n").flat_map(|l| l.split('\n'));

        let request_line = lines
            .next()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| HttpError::Malformed("empty request line".to_string()))?;

        let mut parts = request_line.split_whitespace();
        let (method, uri, version) = match (parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(u), Some(v)) => (m, u, v),
            _ => {
                return Err(HttpError::Malformed(format!(
                    "invalid request line: {}",
                    request_line
                )))
            }
        };

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            match line.split_once(':') {
                Some((name, value)) => {
                    headers.push((name.trim().to_string(), value.trim().to_string()))
                }
                None => tracing::debug!(line = %line, "Skipping malformed request header line"),
            }
        }

        Ok(Self {
            method: method.to_string(),
            uri: uri.to_string(),
            version: version.to_string(),
            headers,
            secure: false,
        })
    }

    /// Mark the request as sent over TLS, as for traffic captured through a
    /// CONNECT tunnel
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Resolve the request-URI to an absolute URL
    ///
    /// Origin-form URIs are resolved against the `Host` header, over `https`
    /// when the request is secure.
    pub fn url(&self) -> Result<Url, HttpError> {
        if self.uri.starts_with('/') {
            let host = self
                .header("host")
                .ok_or_else(|| HttpError::InvalidUrl(self.uri.clone()))?;
            let scheme = if self.secure { "https" } else { "http" };
            let base = Url::parse(&format!("{}://{}", scheme, host))
                .map_err(|e| HttpError::InvalidUrl(format!("{}: {}", self.uri, e)))?;
            return base
                .join(&self.uri)
                .map_err(|e| HttpError::InvalidUrl(format!("{}: {}", self.uri, e)));
        }

        Url::parse(&self.uri).map_err(|e| HttpError::InvalidUrl(format!("{}: {}", self.uri, e)))
    }

    /// Check that the request-URI can be parsed at all
    pub fn is_uri_well_formed(&self) -> bool {
        if self.uri.is_empty() || self.uri.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return false;
        }
        if self.uri.starts_with('/') {
            return Url::parse("http://localhost")
                .and_then(|base| base.join(&self.uri))
                .is_ok();
        }
        Url::parse(&self.uri).is_ok()
    }

    /// Byte range of the raw query string inside `uri` (without the `?`)
    pub fn query_range(&self) -> Option<std::ops::Range<usize>> {
        let start = self.uri.find('?')? + 1;
        let end = self.uri[start..]
            .find('#')
            .map(|i| start + i)
            .unwrap_or(self.uri.len());
        Some(start..end)
    }

    /// Raw query string, if any
    pub fn query(&self) -> Option<&str> {
        self.query_range().map(|r| &self.uri[r])
    }

    /// Byte range of the path inside `uri`
    pub fn path_range(&self) -> std::ops::Range<usize> {
        let start = if self.uri.starts_with('/') {
            0
        } else if let Some(scheme_end) = self.uri.find("://") {
            let authority_start = scheme_end + 3;
            self.uri[authority_start..]
                .find(['/', '?', '#'])
                .map(|i| authority_start + i)
                .unwrap_or(self.uri.len())
        } else {
            0
        };

        let end = self.uri[start..]
            .find(['?', '#'])
            .map(|i| start + i)
            .unwrap_or(self.uri.len());

        start..end
    }

    /// Get a header value (case-insensitive, first occurrence)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a header (case-insensitive)
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace the first occurrence of a header or append it
    pub fn set_header(&mut self, name: &str, value: &str) {
        match self.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    /// Remove every occurrence of a header
    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// Declared content type
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Whether the body is `application/x-www-form-urlencoded`
    pub fn is_form_urlencoded(&self) -> bool {
        self.content_type()
            .map(|ct| ct.to_ascii_lowercase().contains("application/x-www-form-urlencoded"))
            .unwrap_or(false)
    }

    /// Serialize the request head to wire format
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for RequestHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}\r\n", self.method, self.uri, self.version)?;
        for (name, value) in &self.headers {
            write!(f, "{}: {}\r\n", name, value)?;
        }
        write!(f, "\r\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sets_host_header() {
        let req = RequestHeader::new("get", "https://example.com:8443/a?b=1");
        assert_eq!(req.method, "GET");
        assert_eq!(req.header("host"), Some("example.com:8443"));
    }

    #[test]
    fn test_parse_and_serialize() {
        let raw = "POST /login?next=%2F HTTP/1.1\r\nHost: example.com\r\nContent-Type: application/x-www-form-urlencoded\r\n\r\n";
        let req = RequestHeader::parse(raw).unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.uri, "/login?next=%2F");
        assert!(req.is_form_urlencoded());
        assert_eq!(req.to_string(), raw);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(RequestHeader::parse("").is_err());
        assert!(RequestHeader::parse("GET\r\n\r\n").is_err());
    }

    #[test]
    fn test_origin_form_url() {
        let raw = "GET /search?q=test HTTP/1.1\r\nHost: example.test\r\n\r\n";
        let req = RequestHeader::parse(raw).unwrap();
        let url = req.url().unwrap();
        assert_eq!(url.as_str(), "http://example.test/search?q=test");
    }

    #[test]
    fn test_secure_origin_form_url() {
        let raw = "GET /account HTTP/1.1\r\nHost: bank.example.test:443\r\n\r\n";
        let plain = RequestHeader::parse(raw).unwrap();
        assert!(!plain.secure);

        let tunneled = plain.with_secure(true);
        assert_eq!(tunneled.url().unwrap().as_str(), "https://bank.example.test/account");
        assert_eq!(tunneled.to_string(), raw);
    }

    #[test]
    fn test_new_marks_https_secure() {
        assert!(RequestHeader::new("GET", "https://example.test/").secure);
        assert!(!RequestHeader::new("GET", "http://example.test/").secure);
        assert!(!RequestHeader::new("GET", "/relative").secure);
    }

    #[test]
    fn test_query_and_path_ranges() {
        let req = RequestHeader::new("GET", "http://example.test/a/b?x=1&y=2#frag");
        assert_eq!(req.query(), Some("x=1&y=2"));
        assert_eq!(&req.uri[req.path_range()], "/a/b");

        let origin = RequestHeader::new("GET", "/search?q=test&page=2");
        assert_eq!(origin.query(), Some("q=test&page=2"));
        assert_eq!(&origin.uri[origin.path_range()], "/search");
    }

    #[test]
    fn test_well_formed_uri() {
        assert!(RequestHeader::new("GET", "http://example.test/").is_uri_well_formed());
        assert!(!RequestHeader::new("GET", "http://exa mple/").is_uri_well_formed());
        assert!(!RequestHeader::new("GET", "").is_uri_well_formed());
    }

    #[test]
    fn test_set_and_remove_header() {
        let mut req = RequestHeader::new("GET", "http://example.test/");
        req.set_header("X-Test", "1");
        req.set_header("x-test", "2");
        assert_eq!(req.header("X-TEST"), Some("2"));
        req.remove_header("x-test");
        assert!(req.header("x-test").is_none());
    }
}
