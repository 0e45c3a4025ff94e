//! Error types for harrow
//!
//! Library code returns these typed errors; the binary wraps them in
//! `anyhow` with context at the edges.

use thiserror::Error;

/// Main error type for harrow operations
#[derive(Error, Debug)]
pub enum HarrowError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP / network errors
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    /// Scanner errors
    #[error("Scanner error: {0}")]
    Scanner(#[from] ScannerError),

    /// Message store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Vulnerability catalog errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Scope errors
    #[error("Scope error: {0}")]
    Scope(#[from] ScopeError),

    /// Certificate errors
    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {path}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {field} - {reason}")]
    ValidationError { field: String, reason: String },

    #[error("Invalid alert threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid attack strength: {0}")]
    InvalidStrength(String),

    #[error("Invalid indicator pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// HTTP errors
#[derive(Error, Debug, Clone)]
pub enum HttpError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Body too large: {size} bytes (max: {max})")]
    BodyTooLarge { size: usize, max: usize },
}

impl HttpError {
    /// Whether a retry of the same request could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, HttpError::ConnectionError(_) | HttpError::Timeout(_))
    }
}

/// Scanner errors
#[derive(Error, Debug)]
pub enum ScannerError {
    #[error("Invalid target URL: {0}")]
    InvalidTarget(String),

    #[error("Scan already in progress")]
    AlreadyRunning,

    #[error("Cannot rebuild {location} parameter '{name}': {reason}")]
    Rebuild {
        location: String,
        name: String,
        reason: String,
    },
}

/// Message store errors
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("History entry not found: {0}")]
    NotFound(u64),

    #[error("Store is full ({0} entries)")]
    Full(usize),
}

/// Vulnerability catalog errors
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse catalog: {0}")]
    ParseError(String),

    #[error("Catalog entry '{0}' must start with 'vuln_item_'")]
    InvalidKey(String),
}

/// Scope errors
#[derive(Error, Debug, Clone)]
pub enum ScopeError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid regex: {0}")]
    InvalidRegex(String),

    #[error("Invalid CIDR: {0}")]
    InvalidCidr(String),
}

/// Leaf certificate errors
#[derive(Error, Debug)]
pub enum CertificateError {
    #[error("Failed to generate certificate for {host}: {reason}")]
    Generation { host: String, reason: String },

    #[error("Failed to create certificate authority: {0}")]
    Authority(String),
}

impl HarrowError {
    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            HarrowError::Config(e) => format!("Configuration problem: {}", e.user_hint()),
            HarrowError::Http(e) => format!("Network issue: {}", e.user_hint()),
            HarrowError::Scanner(e) => format!("Scanner issue: {}", e.user_hint()),
            HarrowError::Store(e) => format!("History issue: {}", e),
            HarrowError::Catalog(e) => format!("Catalog issue: {}", e),
            HarrowError::Scope(e) => format!("Scope issue: {}", e),
            HarrowError::Certificate(e) => format!("Certificate issue: {}", e),
            HarrowError::Io(e) => format!("File system issue: {}", e),
        }
    }
}

/// Trait for providing user-friendly hints
pub trait UserHint {
    fn user_hint(&self) -> String;
}

impl UserHint for ConfigError {
    fn user_hint(&self) -> String {
        match self {
            ConfigError::ReadError { path, .. } => {
                format!("Could not read '{}'. Check if the file exists and you have read permissions.", path)
            }
            ConfigError::ParseError(_) => {
                "The configuration file has invalid syntax. Check for TOML formatting errors.".into()
            }
            ConfigError::ValidationError { field, reason } => {
                format!("Invalid value for '{}': {}", field, reason)
            }
            ConfigError::InvalidThreshold(value) => {
                format!("'{}' is not a threshold. Use OFF, LOW, MEDIUM, HIGH or DEFAULT.", value)
            }
            _ => self.to_string(),
        }
    }
}

impl UserHint for HttpError {
    fn user_hint(&self) -> String {
        match self {
            HttpError::ConnectionError(_) => {
                "Could not connect to the server. Check if it's running and accessible.".into()
            }
            HttpError::Timeout(ms) => {
                format!("Request timed out after {}ms. The server may be slow or unresponsive.", ms)
            }
            HttpError::InvalidUrl(url) => {
                format!("'{}' is not a valid URL. Check the format.", url)
            }
            _ => self.to_string(),
        }
    }
}

impl UserHint for ScannerError {
    fn user_hint(&self) -> String {
        match self {
            ScannerError::InvalidTarget(url) => {
                format!("'{}' is not a valid scan target. Use a full URL.", url)
            }
            ScannerError::AlreadyRunning => {
                "A scan is already running in this session. Stop it first.".into()
            }
            _ => self.to_string(),
        }
    }
}
