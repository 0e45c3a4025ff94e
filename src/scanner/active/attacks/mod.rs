//! Built-in attack plugins

pub mod command_injection;
pub mod path_traversal;
pub mod sensitive_files;
pub mod sqli;
pub mod xss;

use std::sync::Arc;

use super::ActivePlugin;

pub use command_injection::CommandInjectionPlugin;
pub use path_traversal::PathTraversalPlugin;
pub use sensitive_files::SensitiveFilesPlugin;
pub use sqli::SqlInjectionPlugin;
pub use xss::XssPlugin;

/// Every built-in plugin
pub fn all() -> Vec<Arc<dyn ActivePlugin>> {
    vec![
        Arc::new(XssPlugin),
        Arc::new(SqlInjectionPlugin),
        Arc::new(PathTraversalPlugin),
        Arc::new(CommandInjectionPlugin),
        Arc::new(SensitiveFilesPlugin),
    ]
}

/// Part of `body` matching any of `patterns` that `base` does not already contain
pub(crate) fn new_evidence<'a>(
    patterns: &[regex::Regex],
    body: &'a str,
    base: &str,
) -> Option<&'a str> {
    patterns
        .iter()
        .filter(|re| !re.is_match(base))
        .find_map(|re| re.find(body))
        .map(|m| m.as_str())
}
