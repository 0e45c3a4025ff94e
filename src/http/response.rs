//! HTTP response header

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::HttpError;

/// Status line and headers of a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    /// HTTP version
    pub version: String,

    /// HTTP status code
    pub status: u16,

    /// Reason phrase (e.g., "OK", "Not Found")
    pub reason: String,

    /// Headers in wire order
    pub headers: Vec<(String, String)>,
}

/// Cookie from a `Set-Cookie` header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name
    pub name: String,

    /// Cookie value
    pub value: String,

    /// Domain
    pub domain: Option<String>,

    /// Path
    pub path: Option<String>,

    /// Secure flag
    pub secure: bool,

    /// HttpOnly flag
    pub http_only: bool,

    /// SameSite attribute
    pub same_site: Option<String>,
}

impl Cookie {
    /// Parse one `Set-Cookie` header value
    pub fn parse(set_cookie: &str) -> Option<Self> {
        let mut parts = set_cookie.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie {
            name: name.to_string(),
            value: value.trim().to_string(),
            domain: None,
            path: None,
            secure: false,
            http_only: false,
            same_site: None,
        };

        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (attr.trim(), None),
            };
            match key.to_ascii_lowercase().as_str() {
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                "domain" => cookie.domain = val.map(String::from),
                "path" => cookie.path = val.map(String::from),
                "samesite" => cookie.same_site = val.map(String::from),
                _ => {}
            }
        }

        Some(cookie)
    }
}

impl ResponseHeader {
    /// Create a response header with a status code
    pub fn new(status: u16, reason: &str) -> Self {
        Self {
            version: "HTTP/1.1".to_string(),
            status,
            reason: reason.to_string(),
            headers: Vec::new(),
        }
    }

    /// Parse a raw response head (status line plus header lines)
    pub fn parse(raw: &str) -> Result<Self, HttpError> {
        let mut lines = raw.split("\r\n").flat_map(|l| l.split('\n'));

        let status_line = lines
            .next()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| HttpError::Malformed("empty status line".to_string()))?;

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        let status = parts
            .next()
            .and_then(|s| s.trim().parse::<u16>().ok())
            .ok_or_else(|| HttpError::Malformed(format!("invalid status line: {}", status_line)))?;
        let reason = parts.next().unwrap_or_default();

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
        }

        Ok(Self {
            version: version.to_string(),
            status,
            reason: reason.to_string(),
            headers,
        })
    }

    /// Add a header (keeps duplicates, as `Set-Cookie` needs)
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Get a specific header (case-insensitive)
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

    /// Get content type header
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Whether the declared content type is textual
    ///
    /// A missing content type counts as textual.
    pub fn is_text(&self) -> bool {
        match self.content_type() {
            None => true,
            Some(ct) => {
                let ct = ct.to_ascii_lowercase();
                ct.starts_with("text/")
                    || ct.contains("html")
                    || ct.contains("xml")
                    || ct.contains("json")
                    || ct.contains("javascript")
            }
        }
    }

    /// Check if content is HTML
    pub fn is_html(&self) -> bool {
        self.content_type()
            .map(|ct| ct.to_ascii_lowercase().contains("html"))
            .unwrap_or(false)
    }

    /// Check if response is redirect (3xx)
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// Cookies set by this response
    pub fn cookies(&self) -> Vec<Cookie> {
        self.header_values("set-cookie").filter_map(Cookie::parse).collect()
    }

    /// Serialize the response head to wire format
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for ResponseHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}\r\n", self.version, self.status, self.reason)?;
        for (name, value) in &self.headers {
            write!(f, "{}: {}\r\n", name, value)?;
        }
        write!(f, "\r\n")
    }
}
