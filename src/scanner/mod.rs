//! Security scanner module
//!
//! Passive analysis of observed traffic and active attacks against
//! injection points, both reporting into one alert collector.

mod alert;
mod catalog;
mod threshold;
pub mod active;
pub mod auth_state;
pub mod passive;
pub mod policies;
pub mod variant;

pub use alert::{Alert, AlertCollector, AlertSink};
pub use catalog::{Catalog, CatalogEntry, SharedCatalog};
pub use threshold::{AlertThreshold, AttackStrength, Confidence, Risk};
pub use active::{ActivePlugin, ActiveScanner, ScanControl, ScanIssue, ScanProgress};
pub use auth_state::AuthStateDetector;
pub use passive::{PassiveAnalyzer, PassiveScanDispatcher};
pub use policies::{PluginConfig, PolicySettings, ScanPolicy};
pub use variant::{InjectionPoint, LocationKind, Variant, VariantFactory};
