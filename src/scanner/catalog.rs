//! Vulnerability catalog
//!
//! Static titles, descriptions and solutions keyed `vuln_item_<id>`, read
//! once and swapped whole on reload.

use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::alert::Alert;
use super::threshold::{Confidence, Risk};
use crate::error::CatalogError;

const KEY_PREFIX: &str = "vuln_item_";
const BUNDLED: &str = include_str!("../../resources/vulnerabilities.toml");

/// Static metadata of one vulnerability
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    /// Alert title
    pub alert: String,

    /// Description
    pub desc: String,

    /// Remediation advice
    pub solution: String,

    /// Reference links
    #[serde(default)]
    pub references: Vec<String>,
}

/// Read-only vulnerability catalog
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<String, CatalogEntry>,
}

impl Catalog {
    /// Parse a TOML catalog document
    pub fn parse(contents: &str) -> Result<Self, CatalogError> {
        let table: toml::Table =
            toml::from_str(contents).map_err(|e| CatalogError::ParseError(e.to_string()))?;

        let mut entries = HashMap::with_capacity(table.len());
        for (key, value) in table {
            let id = key
                .strip_prefix(KEY_PREFIX)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| CatalogError::InvalidKey(key.clone()))?
                .to_string();
            let entry: CatalogEntry = value
                .try_into()
                .map_err(|e: toml::de::Error| CatalogError::ParseError(format!("{}: {}", key, e)))?;
            entries.insert(id, entry);
        }

        Ok(Self { entries })
    }

    /// Catalog compiled into the binary
    pub fn bundled() -> Result<Self, CatalogError> {
        Self::parse(BUNDLED)
    }

    /// Load a catalog file
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CatalogError::ReadError {
            path: path.display().to_string(),
            source,
        })?;
        let catalog = Self::parse(&contents)?;
        tracing::info!(path = %path.display(), entries = catalog.len(), "Loaded vulnerability catalog");
        Ok(catalog)
    }

    /// Entry by numeric id
    pub fn get(&self, id: u32) -> Option<&CatalogEntry> {
        self.entries.get(&id.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build an alert from catalog entry `vuln_id`.
    ///
    /// A missing entry yields a degraded alert titled with the catalog key.
    pub fn alert(&self, vuln_id: u32, plugin_id: u32, risk: Risk, confidence: Confidence) -> Alert {
        match self.get(vuln_id) {
            Some(entry) => {
                let mut alert = Alert::new(plugin_id, &entry.alert, risk, confidence)
                    .with_description(&entry.desc)
                    .with_solution(&entry.solution);
                alert.references = entry.references.clone();
                alert
            }
            None => {
                tracing::warn!(vuln_id, plugin_id, "Vulnerability catalog entry missing");
                Alert::new(plugin_id, &format!("{}{}", KEY_PREFIX, vuln_id), risk, confidence)
            }
        }
    }
}

/// Catalog handle shared by a session; reload replaces it atomically
pub struct SharedCatalog {
    current: RwLock<Arc<Catalog>>,
}

impl SharedCatalog {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    /// The catalog in effect; readers keep their copy across a reload
    pub fn current(&self) -> Arc<Catalog> {
        Arc::clone(&self.current.read())
    }

    /// Replace the catalog
    pub fn replace(&self, catalog: Catalog) {
        *self.current.write() = Arc::new(catalog);
    }

    /// Reload from a file; the old catalog stays in place on error
    pub fn reload(&self, path: &Path) -> Result<(), CatalogError> {
        let catalog = Catalog::load(path)?;
        self.replace(catalog);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_bundled_catalog_parses() {
        let catalog = Catalog::bundled().unwrap();
        assert!(catalog.len() >= 15);
        assert_eq!(catalog.get(2).unwrap().alert, "SQL Injection");
    }

    #[test]
    fn test_alert_from_entry() {
        let catalog = Catalog::parse(
            r#"
            [vuln_item_7]
            alert = "Test Alert"
            desc = "Description"
            solution = "Fix it"
            references = ["https://example.test/ref"]
            "#,
        )
        .unwrap();

        let alert = catalog.alert(7, 100, Risk::Medium, Confidence::High);
        assert_eq!(alert.name, "Test Alert");
        assert_eq!(alert.description, "Description");
        assert_eq!(alert.solution, "Fix it");
        assert_eq!(alert.references, vec!["https://example.test/ref"]);
        assert_eq!(alert.plugin_id, 100);
    }

    #[test]
    fn test_missing_entry_degrades() {
        let alert = Catalog::default().alert(99, 1, Risk::Low, Confidence::Low);
        assert_eq!(alert.name, "vuln_item_99");
        assert!(alert.description.is_empty());
    }

    #[test]
    fn test_invalid_keys_and_entries() {
        assert!(matches!(
            Catalog::parse("[item_1]\nalert = \"x\"\ndesc = \"\"\nsolution = \"\""),
            Err(CatalogError::InvalidKey(_))
        ));
        assert!(matches!(
            Catalog::parse("[vuln_item_1]\nalert = \"x\""),
            Err(CatalogError::ParseError(_))
        ));
        assert!(Catalog::parse("not toml [").is_err());
    }

    #[test]
    fn test_reload_swaps_whole_catalog() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.toml");
        std::fs::write(
            &path,
            "[vuln_item_1]\nalert = \"Reloaded\"\ndesc = \"d\"\nsolution = \"s\"\n",
        )
        .unwrap();

        let shared = SharedCatalog::new(Catalog::bundled().unwrap());
        let before = shared.current();
        shared.reload(&path).unwrap();

        assert_eq!(before.get(1).unwrap().alert, "Cross Site Scripting (Reflected)");
        assert_eq!(shared.current().get(1).unwrap().alert, "Reloaded");
        assert_eq!(shared.current().len(), 1);

        assert!(shared.reload(&dir.path().join("missing.toml")).is_err());
        assert_eq!(shared.current().get(1).unwrap().alert, "Reloaded");
    }
}
