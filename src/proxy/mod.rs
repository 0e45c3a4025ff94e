//! Capture-side collaborators
//!
//! Message history storage and leaf certificates for TLS interception.

mod history;
mod tls;

pub use history::{HistoryRecord, InMemoryStore, MessageStore};
pub use tls::{CertificateAuthority, LeafCertificate, LeafCertificateSource};
