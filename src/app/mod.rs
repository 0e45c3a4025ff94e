//! Application settings
//!
//! Configuration shared by the spider, the scanners and the headless runner.

mod config;

pub use config::{
    AnalyzerConfig, AuthIndicatorConfig, Config, GeneralConfig, PassiveConfig, ScannerConfig,
    ScopeConfig, SpiderConfig,
};
