//! Application configuration management

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::scanner::AlertThreshold;
use crate::spider::DEFAULT_MAX_PARSE_SIZE;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Spider settings
    pub spider: SpiderConfig,

    /// Active scanner and HTTP settings
    pub scanner: ScannerConfig,

    /// Passive analyzer settings
    pub passive: PassiveConfig,

    /// Scope rules
    pub scope: ScopeConfig,

    /// Authentication state indicators
    pub auth: AuthIndicatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Maximum messages kept in the in-memory history
    pub max_history_items: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpiderConfig {
    /// Maximum depth to crawl (seed is depth 0)
    pub max_depth: usize,

    /// Maximum URLs accepted into the frontier
    pub max_pages: usize,

    /// Concurrent fetch workers
    pub threads: usize,

    /// Delay between requests per worker in milliseconds
    pub delay_ms: u64,

    /// Responses larger than this are not parsed
    pub max_parse_size: usize,

    /// Seed the crawl from robots.txt
    pub parse_robots: bool,

    /// Submit discovered forms with their default values
    pub submit_forms: bool,

    /// Also submit POST forms (GET forms are always submitted when forms are on)
    pub post_forms: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Maximum concurrent scan workers
    pub max_threads: usize,

    /// Request timeout in seconds
    pub request_timeout: u64,

    /// Retries for transient network failures
    pub max_retries: u32,

    /// Base backoff between retries in milliseconds
    pub retry_backoff_ms: u64,

    /// Delay between attack requests in milliseconds
    pub request_delay: u64,

    /// Follow redirects
    pub follow_redirects: bool,

    /// Maximum redirect depth
    pub max_redirects: usize,

    /// Accept invalid TLS certificates on targets
    pub accept_invalid_certs: bool,

    /// Response size limit in bytes
    pub max_response_size: usize,

    /// Scan policy preset (standard, quick, full)
    pub policy: String,

    /// External vulnerability catalog (bundled catalog when unset)
    pub catalog_path: Option<PathBuf>,

    /// User agent string
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PassiveConfig {
    /// Per-analyzer settings keyed by analyzer key (e.g. `cookie-security`)
    pub analyzers: HashMap<String, AnalyzerConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Whether the analyzer runs
    pub enabled: bool,

    /// Reporting threshold
    pub threshold: AlertThreshold,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScopeConfig {
    /// URL regexes that are in scope (empty: the crawl seed's origin)
    pub include: Vec<String>,

    /// URL regexes that are never in scope
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthIndicatorConfig {
    /// Regex matched against responses while authenticated
    pub logged_in_indicator: Option<String>,

    /// Regex matched against responses after losing the session
    pub logged_out_indicator: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            max_history_items: 100_000,
        }
    }
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_pages: 1000,
            threads: 4,
            delay_ms: 100,
            max_parse_size: DEFAULT_MAX_PARSE_SIZE,
            parse_robots: true,
            submit_forms: true,
            post_forms: false,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_threads: 10,
            request_timeout: 30,
            max_retries: 2,
            retry_backoff_ms: 250,
            request_delay: 0,
            follow_redirects: false,
            max_redirects: 10,
            accept_invalid_certs: true,
            max_response_size: 50 * 1024 * 1024, // 50MB
            policy: "standard".to_string(),
            catalog_path: None,
            user_agent: format!("harrow/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: AlertThreshold::Default,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_config_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !config_path.exists() {
            if path.is_some() {
                return Err(ConfigError::ReadError {
                    path: config_path.display().to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
                });
            }
            tracing::info!("No configuration file found, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::ReadError {
            path: config_path.display().to_string(),
            source,
        })?;

        let config = Self::from_toml(&contents)?;
        tracing::info!(path = %config_path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that cannot work at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &str, reason: &str) -> ConfigError {
            ConfigError::ValidationError {
                field: field.to_string(),
                reason: reason.to_string(),
            }
        }

        if self.spider.threads == 0 {
            return Err(invalid("spider.threads", "must be greater than 0"));
        }
        if self.spider.max_parse_size == 0 {
            return Err(invalid("spider.max_parse_size", "must be greater than 0"));
        }
        if self.scanner.max_threads == 0 {
            return Err(invalid("scanner.max_threads", "must be greater than 0"));
        }
        if self.scanner.request_timeout == 0 {
            return Err(invalid("scanner.request_timeout", "must be greater than 0"));
        }

        for pattern in self.scope.include.iter().chain(self.scope.exclude.iter()) {
            regex::Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        }

        let indicators = [
            &self.auth.logged_in_indicator,
            &self.auth.logged_out_indicator,
        ];
        for pattern in indicators.into_iter().flatten() {
            regex::Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::ReadError {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        std::fs::write(path, contents).map_err(|source| ConfigError::ReadError {
            path: path.display().to_string(),
            source,
        })?;

        tracing::info!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Settings of one passive analyzer (defaults when not configured)
    pub fn analyzer(&self, key: &str) -> AnalyzerConfig {
        self.passive.analyzers.get(key).copied().unwrap_or_default()
    }

    /// Get default configuration file path
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "harrow", "harrow")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get data directory path
    pub fn data_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "harrow", "harrow")
            .map(|dirs| dirs.data_dir().to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.spider.max_parse_size, 512_000);
    }

    #[test]
    fn test_parse_analyzer_thresholds() {
        let config = Config::from_toml(
            r#"
            [spider]
            max_depth = 2

            [passive.analyzers.cookie-security]
            enabled = true
            threshold = "LOW"

            [passive.analyzers.security-headers]
            enabled = false
            threshold = "OFF"
            "#,
        )
        .unwrap();

        assert_eq!(config.spider.max_depth, 2);
        assert_eq!(config.analyzer("cookie-security").threshold, AlertThreshold::Low);
        assert!(!config.analyzer("security-headers").enabled);
        assert_eq!(config.analyzer("unknown").threshold, AlertThreshold::Default);
    }

    #[test]
    fn test_invalid_threshold_is_rejected() {
        let result = Config::from_toml(
            r#"
            [passive.analyzers.cookie-security]
            threshold = "SEVERE"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Config::default();
        config.scanner.max_threads = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scope.exclude.push("(unclosed".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("harrow.toml");

        let mut config = Config::default();
        config.spider.max_depth = 7;
        config.scope.include.push(r"^https://app\.example\.test/".to_string());
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.spider.max_depth, 7);
        assert_eq!(loaded.scope.include.len(), 1);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
