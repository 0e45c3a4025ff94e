//! Scan policies for configuring active scan behavior

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::app::ScannerConfig;
use crate::error::ConfigError;
use crate::scanner::{AlertThreshold, AttackStrength};

/// Scan policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPolicy {
    /// Policy name
    pub name: String,

    /// Description
    pub description: String,

    /// Per-plugin settings keyed by plugin key
    pub plugins: HashMap<String, PluginConfig>,

    /// Global settings
    pub settings: PolicySettings,
}

/// Configuration for an individual attack plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Whether the plugin is enabled
    pub enabled: bool,

    /// How many payloads to try
    pub strength: AttackStrength,

    /// How sure a finding must be to be reported
    pub threshold: AlertThreshold,
}

/// Global policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySettings {
    /// Maximum concurrent node scans
    pub max_threads: usize,

    /// Delay between attack requests in milliseconds
    pub delay_ms: u64,

    /// Whether to scan query parameters
    pub scan_query_params: bool,

    /// Whether to scan URL path segments
    pub scan_url_path: bool,

    /// Whether to scan POST body
    pub scan_post_body: bool,

    /// Whether to scan headers
    pub scan_headers: bool,

    /// Whether to scan cookies
    pub scan_cookies: bool,

    /// Whether to scan JSON bodies
    pub scan_json: bool,

    /// Whether to scan XML bodies
    pub scan_xml: bool,

    /// Request headers treated as injection points
    pub injectable_headers: Vec<String>,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl ScanPolicy {
    /// Standard scan policy - balanced between speed and coverage
    pub fn standard() -> Self {
        let mut plugins = HashMap::new();

        for key in ["xss", "sqli", "path_traversal", "sensitive_files"] {
            plugins.insert(key.to_string(), PluginConfig::default());
        }

        plugins.insert(
            "command_injection".to_string(),
            PluginConfig {
                enabled: true,
                strength: AttackStrength::Low,
                threshold: AlertThreshold::Medium,
            },
        );

        Self {
            name: "Standard".to_string(),
            description: "Balanced scan with common vulnerability checks".to_string(),
            plugins,
            settings: PolicySettings::default(),
        }
    }

    /// Quick scan - fast but limited coverage
    pub fn quick() -> Self {
        let mut policy = Self::standard();
        policy.name = "Quick".to_string();
        policy.description = "Fast scan with reduced payloads".to_string();

        for config in policy.plugins.values_mut() {
            config.strength = AttackStrength::Low;
        }

        policy.settings.delay_ms = 0;
        policy
    }

    /// Full scan - comprehensive but slow
    pub fn full() -> Self {
        let mut policy = Self::standard();
        policy.name = "Full".to_string();
        policy.description = "Comprehensive scan with every location and payload".to_string();

        for config in policy.plugins.values_mut() {
            config.strength = AttackStrength::Insane;
            config.threshold = AlertThreshold::Low;
        }

        policy.settings.scan_headers = true;
        policy.settings.scan_cookies = true;
        policy.settings.scan_url_path = true;
        policy
    }

    /// Passive-only scan
    pub fn passive_only() -> Self {
        let mut policy = Self::standard();
        policy.name = "Passive Only".to_string();
        policy.description = "Only passive analysis, no active attacks".to_string();

        for config in policy.plugins.values_mut() {
            config.enabled = false;
        }

        policy
    }

    /// Preset by name
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name.to_ascii_lowercase().as_str() {
            "standard" | "default" => Ok(Self::standard()),
            "quick" => Ok(Self::quick()),
            "full" => Ok(Self::full()),
            "passive" | "passive_only" => Ok(Self::passive_only()),
            other => Err(ConfigError::ValidationError {
                field: "scanner.policy".to_string(),
                reason: format!("unknown policy '{}'", other),
            }),
        }
    }

    /// Preset named in the scanner config, with its thread count and delay
    pub fn from_config(config: &ScannerConfig) -> Result<Self, ConfigError> {
        let mut policy = Self::from_name(&config.policy)?;
        policy.settings.max_threads = config.max_threads;
        policy.settings.delay_ms = config.request_delay;
        Ok(policy)
    }

    /// Settings of one plugin; unknown plugins run with defaults
    pub fn plugin(&self, key: &str) -> PluginConfig {
        self.plugins.get(key).copied().unwrap_or_default()
    }

    /// Check if a plugin is enabled
    pub fn is_enabled(&self, key: &str) -> bool {
        let config = self.plugin(key);
        config.enabled && !config.threshold.is_off()
    }

    /// Enable a plugin
    pub fn enable_plugin(&mut self, key: &str) {
        self.plugins.entry(key.to_string()).or_default().enabled = true;
    }

    /// Disable a plugin
    pub fn disable_plugin(&mut self, key: &str) {
        self.plugins.entry(key.to_string()).or_default().enabled = false;
    }

    /// Set plugin strength
    pub fn set_strength(&mut self, key: &str, strength: AttackStrength) {
        self.plugins.entry(key.to_string()).or_default().strength = strength;
    }
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            max_threads: 5,
            delay_ms: 0,
            scan_query_params: true,
            scan_url_path: false,
            scan_post_body: true,
            scan_headers: false,
            scan_cookies: false,
            scan_json: true,
            scan_xml: true,
            injectable_headers: vec!["User-Agent".to_string(), "Referer".to_string()],
        }
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strength: AttackStrength::Medium,
            threshold: AlertThreshold::Default,
        }
    }
}
