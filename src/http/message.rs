//! One captured request/response exchange

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use super::request::RequestHeader;
use super::response::ResponseHeader;
use crate::error::HttpError;

/// Where a message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryType {
    /// Relayed through the intercepting proxy
    Proxied,
    /// Sent manually by the user
    Manual,
    /// Fetched by the spider
    Spider,
    /// Discovered by the spider, not yet fetched
    SpiderTask,
    /// Sent by the active scanner
    Scanner,
    /// Sent by the fuzzer
    Fuzzer,
    /// Authentication request
    Auth,
}

impl HistoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryType::Proxied => "proxied",
            HistoryType::Manual => "manual",
            HistoryType::Spider => "spider",
            HistoryType::SpiderTask => "spider_task",
            HistoryType::Scanner => "scanner",
            HistoryType::Fuzzer => "fuzzer",
            HistoryType::Auth => "auth",
        }
    }
}

/// Identifier assigned by the message store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HistoryId(pub u64);

impl fmt::Display for HistoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request/response exchange plus metadata.
///
/// Once handed to analyzers a message is treated as read-only; anything that
/// rewrites it works on a clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpMessage {
    /// Request line and headers
    pub request: RequestHeader,

    /// Request body
    pub request_body: Vec<u8>,

    /// Response line and headers, absent until the response arrives
    pub response: Option<ResponseHeader>,

    /// Response body
    pub response_body: Vec<u8>,

    /// Free-text note
    pub note: Option<String>,

    /// Origin of the message
    pub history_type: HistoryType,

    /// Store identifier once persisted
    pub id: Option<HistoryId>,

    /// Round-trip time in milliseconds
    pub elapsed_ms: Option<u64>,

    /// When the message was created
    pub timestamp: DateTime<Utc>,
}

impl HttpMessage {
    /// Wrap a request header
    pub fn new(request: RequestHeader) -> Self {
        Self {
            request,
            request_body: Vec::new(),
            response: None,
            response_body: Vec::new(),
            note: None,
            history_type: HistoryType::Manual,
            id: None,
            elapsed_ms: None,
            timestamp: Utc::now(),
        }
    }

    /// Build a GET message for an absolute URL
    pub fn get(url: &str) -> Result<Self, HttpError> {
        Url::parse(url).map_err(|e| HttpError::InvalidUrl(format!("{}: {}", url, e)))?;
        Ok(Self::new(RequestHeader::new("GET", url)))
    }

    /// Build a form POST message for an absolute URL
    pub fn post_form(url: &str, body: &str) -> Result<Self, HttpError> {
        Url::parse(url).map_err(|e| HttpError::InvalidUrl(format!("{}: {}", url, e)))?;
        let mut request = RequestHeader::new("POST", url);
        request.set_header("Content-Type", "application/x-www-form-urlencoded");
        request.set_header("Content-Length", &body.len().to_string());

        let mut message = Self::new(request);
        message.request_body = body.as_bytes().to_vec();
        Ok(message)
    }

    /// Rebuild a relayed exchange from its raw request head and body.
    ///
    /// `secure` is whether the client reached the proxy through a CONNECT
    /// tunnel; origin-form requests then resolve to `https`.
    pub fn captured(head: &str, body: Vec<u8>, secure: bool) -> Result<Self, HttpError> {
        let request = RequestHeader::parse(head)?.with_secure(secure);
        request.url()?;

        let mut message = Self::new(request);
        message.request_body = body;
        message.history_type = HistoryType::Proxied;
        Ok(message)
    }

    /// Set the request body and keep an existing Content-Length in sync
    pub fn set_request_body(&mut self, body: Vec<u8>) {
        if self.request.header("content-length").is_some() {
            self.request.set_header("Content-Length", &body.len().to_string());
        }
        self.request_body = body;
    }

    /// Attach a response
    pub fn set_response(&mut self, response: ResponseHeader, body: Vec<u8>) {
        self.response = Some(response);
        self.response_body = body;
    }

    /// Absolute URL of the request
    pub fn url(&self) -> Result<Url, HttpError> {
        self.request.url()
    }

    /// URL as a string for display and alerts, falling back to the raw URI
    pub fn url_string(&self) -> String {
        self.url()
            .map(|u| u.to_string())
            .unwrap_or_else(|_| self.request.uri.clone())
    }

    /// `scheme://host[:port]` of the request
    pub fn origin(&self) -> Option<String> {
        let url = self.url().ok()?;
        Some(url.origin().ascii_serialization())
    }

    /// Whether the request goes over TLS
    pub fn is_https(&self) -> bool {
        self.url().map(|u| u.scheme() == "https").unwrap_or(false)
    }

    /// Whether a response has been received
    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    /// Response status code, if any
    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }

    /// Request body as (lossy) text
    pub fn request_body_text(&self) -> String {
        String::from_utf8_lossy(&self.request_body).to_string()
    }

    /// Response body as (lossy) text
    pub fn response_body_text(&self) -> String {
        String::from_utf8_lossy(&self.response_body).to_string()
    }

    /// Response header lookup
    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.response.as_ref().and_then(|r| r.header(name))
    }

    /// Request in wire format
    pub fn request_bytes(&self) -> Vec<u8> {
        let mut bytes = self.request.to_bytes();
        bytes.extend_from_slice(&self.request_body);
        bytes
    }

    /// Response in wire format (empty until a response arrives)
    pub fn response_bytes(&self) -> Vec<u8> {
        match &self.response {
            Some(header) => {
                let mut bytes = header.to_bytes();
                bytes.extend_from_slice(&self.response_body);
                bytes
            }
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_message() {
        let msg = HttpMessage::get("https://example.test/a?b=1").unwrap();
        assert_eq!(msg.request.method, "GET");
        assert!(msg.is_https());
        assert!(!msg.has_response());
        assert_eq!(msg.origin().as_deref(), Some("https://example.test"));
    }

    #[test]
    fn test_captured_over_tunnel_is_https() {
        let head = "POST /transfer HTTP/1.1\r\nHost: bank.example.test\r\nContent-Length: 5\r\n\r\n";
        let msg = HttpMessage::captured(head, b"amt=1".to_vec(), true).unwrap();
        assert!(msg.is_https());
        assert_eq!(msg.url_string(), "https://bank.example.test/transfer");
        assert_eq!(msg.origin().as_deref(), Some("https://bank.example.test"));
        assert_eq!(msg.history_type, HistoryType::Proxied);

        let plain = HttpMessage::captured(head, Vec::new(), false).unwrap();
        assert!(!plain.is_https());
    }

    #[test]
    fn test_captured_without_host_is_rejected() {
        assert!(HttpMessage::captured("GET / HTTP/1.1\r\n\r\n", Vec::new(), true).is_err());
    }

    #[test]
    fn test_get_rejects_invalid_url() {
        assert!(HttpMessage::get("not a url").is_err());
    }

    #[test]
    fn test_post_form_sets_headers() {
        let msg = HttpMessage::post_form("http://example.test/login", "user=a&pass=b").unwrap();
        assert!(msg.request.is_form_urlencoded());
        assert_eq!(msg.request.header("content-length"), Some("13"));
        assert_eq!(msg.request_body_text(), "user=a&pass=b");
    }

    #[test]
    fn test_set_request_body_updates_length() {
        let mut msg = HttpMessage::post_form("http://example.test/", "a=1").unwrap();
        msg.set_request_body(b"a=12345".to_vec());
        assert_eq!(msg.request.header("content-length"), Some("7"));
    }

    #[test]
    fn test_wire_bytes() {
        let mut msg = HttpMessage::get("http://example.test/").unwrap();
        msg.set_response(
            ResponseHeader::new(200, "OK").with_header("Content-Type", "text/plain"),
            b"hello".to_vec(),
        );

        let request = String::from_utf8(msg.request_bytes()).unwrap();
        assert!(request.starts_with("GET http://example.test/ HTTP/1.1\r\nHost: example.test\r\n"));

        let response = String::from_utf8(msg.response_bytes()).unwrap();
        assert!(response.ends_with("\r\n\r\nhello"));
        assert_eq!(msg.status(), Some(200));
    }
}
